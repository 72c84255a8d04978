use anyhow::Result;
use clap::Parser;
use log::{debug, info};
use modcss_core::{
    PathAlias, default_stylesheet_extensions, find_git_root, has_stylesheet_extension,
    read_path_aliases,
};
use std::{
    env,
    path::{Path, PathBuf},
};

use crate::stylesheet::LocalsConvention;

#[derive(Debug, Clone, Parser)]
#[command(name = "optimize")]
#[command(about = "Inline CSS Modules class names and drop unused rules")]
pub struct Config {
    /// Root directory of the project (defaults to git root)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Stylesheet compilation manifest, relative to the root unless absolute
    #[arg(long, default_value = "css-modules.json")]
    pub manifest: PathBuf,

    /// Directory to write optimized output to (omit for a dry run)
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Glob pattern to filter entry files
    #[arg(long)]
    pub entry_glob: Option<String>,

    /// Extension of stylesheet requests, repeatable (defaults to css, less, scss, sass)
    #[arg(long = "stylesheet-ext", value_name = "EXT")]
    pub stylesheet_exts: Vec<String>,

    /// How class names are exported to scripts
    #[arg(long, value_enum, default_value_t = LocalsConvention::AsIs)]
    pub locals_convention: LocalsConvention,

    #[clap(skip)]
    pub aliases: Vec<PathAlias>,
}

impl Config {
    /// Resolves the project root, loads tsconfig path aliases and fills in
    /// default stylesheet extensions. Returns the root.
    pub fn initialize(&mut self) -> Result<PathBuf> {
        let root = match self.root.take() {
            Some(r) => {
                debug!("Using provided root directory: {:?}", r);
                r.canonicalize().unwrap_or(r)
            }
            None => {
                debug!("No root provided, searching for git root");
                find_git_root(&env::current_dir()?)?
            }
        };
        info!("Using root directory: {}", root.display());
        self.root = Some(root.clone());

        self.aliases = read_path_aliases(&root);
        if self.stylesheet_exts.is_empty() {
            self.stylesheet_exts = default_stylesheet_extensions();
        }
        debug!("Stylesheet extensions: {:?}", self.stylesheet_exts);
        Ok(root)
    }

    pub fn is_stylesheet(&self, request: &str) -> bool {
        has_stylesheet_extension(request, &self.stylesheet_exts)
    }

    pub fn manifest_path(&self, root: &Path) -> PathBuf {
        root.join(&self.manifest)
    }
}

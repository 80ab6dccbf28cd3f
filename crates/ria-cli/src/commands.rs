use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use colored::Colorize;
use ria_protocol::Driver;
use ria_remote::{GitConfig, RiaRemote};
use ria_ssh::OpenSshSessions;
use ria_store::StoreLayout;
use ria_types::{ContentKey, RepositoryId};
use serde::Serialize;
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        None => cmd_serve(),
        Some(Command::Locate(args)) => cmd_locate(args),
    }
}

/// Answer the host on stdin/stdout until it hangs up.
fn cmd_serve() -> anyhow::Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut remote = RiaRemote::new(Box::new(GitConfig::new()), Box::new(OpenSshSessions::new()));
    let mut driver = Driver::new(stdin.lock(), stdout.lock());
    let result = driver.run(&mut remote);
    remote.close();
    debug!("protocol session finished");
    result.context("special remote protocol session failed")
}

#[derive(Serialize)]
struct Location {
    #[serde(flatten)]
    layout: StoreLayout,
    dataset_tree_marker: PathBuf,
    object_tree_marker: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    object: Option<PathBuf>,
}

fn locate(base_path: &Path, id: &str, key: Option<&str>) -> anyhow::Result<Location> {
    if !base_path.is_absolute() {
        bail!("base path must be absolute: {}", base_path.display());
    }
    let id = RepositoryId::parse(id)?;
    let layout = StoreLayout::locate(base_path, &id);
    let object = key
        .map(|k| ContentKey::parse(k).map(|k| layout.object_path(&k)))
        .transpose()?;
    Ok(Location {
        dataset_tree_marker: layout.dataset_tree_marker(),
        object_tree_marker: layout.object_tree_marker(),
        layout,
        object,
    })
}

fn cmd_locate(args: LocateArgs) -> anyhow::Result<()> {
    let location = locate(Path::new(&args.base_path), &args.id, args.key.as_deref())?;
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&location)?),
        OutputFormat::Text => {
            let layout = &location.layout;
            println!("{} {}", "Repository:".bold(), layout.repo_root.display());
            println!("  Archive:      {}", layout.archive_path.display());
            println!("  Object tree:  {}", layout.object_root.display());
            println!("  Markers:      {}", location.dataset_tree_marker.display());
            println!("                {}", location.object_tree_marker.display());
            if let Some(object) = &location.object {
                println!("  {} {}", "Object:".green(), object.display().to_string().yellow());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "8f2b1c9e-0d6a-11ea-8d71-362b9e155667";
    const KEY: &str = "MD5E-s8--7e55db001d319a94b0b713529a756623.txt";

    #[test]
    fn locate_key() {
        let location = locate(Path::new("/store"), ID, Some(KEY)).unwrap();
        let root = PathBuf::from("/store/8f2/b1c9e-0d6a-11ea-8d71-362b9e155667");
        assert_eq!(location.layout.repo_root, root);
        assert_eq!(location.object_tree_marker, root.join("ria-layout-version"));
        assert_eq!(
            location.object.unwrap(),
            root.join(format!("annex/objects/297/61b/{KEY}/{KEY}"))
        );
    }

    #[test]
    fn locate_rejects_bad_input() {
        assert!(locate(Path::new("store"), ID, None).is_err());
        assert!(locate(Path::new("/store"), "ab", None).is_err());
        assert!(locate(Path::new("/store"), ID, Some("a/b")).is_err());
    }

    #[test]
    fn json_output_flattens_layout() {
        let location = locate(Path::new("/store"), ID, None).unwrap();
        let json = serde_json::to_value(&location).unwrap();
        assert_eq!(json["dataset_tree_marker"], "/store/ria-layout-version");
        assert!(json["repo_root"].is_string());
        assert!(json.get("object").is_none());
    }
}

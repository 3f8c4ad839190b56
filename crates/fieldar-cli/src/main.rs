//! `fieldar` - command-line access to a FieldAR machine store.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use fieldar_core::paths::{documents_dir, DOCUMENTS_DIR_ENV};
use fieldar_core::persistence::encode_document;
use fieldar_core::{MachineStore, StoreError};

#[derive(Parser, Debug)]
#[command(name = "fieldar", version, about = "Manage FieldAR machine folders")]
struct Cli {
    /// Documents directory containing the FieldAR folder
    #[arg(long, global = true, env = DOCUMENTS_DIR_ENV)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// List machine ids
    List,
    /// Create a machine (keeps an existing document)
    Create {
        id: String,
        #[arg(long)]
        base_image: Option<PathBuf>,
    },
    /// Delete a machine and all of its files
    Delete { id: String },
    /// Print a machine's overlay document
    Show { id: String },
    /// Copy a machine folder to DEST/<id>
    Export { id: String, dest: PathBuf },
    /// Import one machine folder or a folder of machines
    Import { src: PathBuf },
    /// List a machine's overlay images
    Images { id: String },
    /// Add an overlay image and print the stored name
    AddImage {
        id: String,
        file: PathBuf,
        #[arg(long)]
        name: Option<String>,
    },
    /// Remove an overlay image
    RemoveImage { id: String, name: String },
    /// Replace a machine's base image
    BaseImage { id: String, file: PathBuf },
}

fn read_file(path: &Path) -> Result<Vec<u8>, StoreError> {
    fs::read(path).map_err(StoreError::Io)
}

async fn run(store: &MachineStore, command: Command) -> Result<(), StoreError> {
    match command {
        Command::List => {
            for id in store.list_machines().await? {
                println!("{id}");
            }
        }
        Command::Create { id, base_image } => {
            let data = base_image.as_deref().map(read_file).transpose()?;
            store.create_machine(&id, data).await?;
        }
        Command::Delete { id } => store.delete_machine(&id).await?,
        Command::Show { id } => {
            let doc = store.load_document(&id).await?;
            print!("{}", String::from_utf8_lossy(&encode_document(&doc)?));
        }
        Command::Export { id, dest } => {
            let path = store.export_machine(&id, &dest).await?;
            println!("{}", path.display());
        }
        Command::Import { src } => {
            for id in store.import_machine(&src).await? {
                println!("{id}");
            }
        }
        Command::Images { id } => {
            for name in store.list_overlay_images(&id).await? {
                println!("{name}");
            }
        }
        Command::AddImage { id, file, name } => {
            let data = read_file(&file)?;
            let suggested = name.or_else(|| {
                file.file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
            });
            let stored = store
                .save_overlay_image(&id, data, suggested.as_deref())
                .await?;
            println!("{stored}");
        }
        Command::RemoveImage { id, name } => store.delete_overlay_image(&id, &name).await?,
        Command::BaseImage { id, file } => {
            let data = read_file(&file)?;
            store.save_base_image(&id, data).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let root = match cli.root.map(Ok).unwrap_or_else(documents_dir) {
        Ok(root) => root,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    log::debug!("Using documents root {}", root.display());

    let store = MachineStore::new(root);
    match run(&store, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

// Command-line surface: clap definitions and dispatch onto `Client`.

use crate::api::{Client, Ensured, ParentRef, Transport};
use crate::bulk::{self, BatchOptions, BatchReport, TagPolicy};
use crate::config::{Config, Overrides};
use crate::models::{ItemUpdate, LocationUpdate};
use crate::ui;
use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Manage Homebox locations, items and tags from the command line.
#[derive(Parser, Debug)]
#[command(name = "homebox-cli", version, about, long_about = None)]
pub struct Cli {
    /// Credentials file (defaults to <config dir>/homebox-cli/credentials.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// API base URL, e.g. http://localhost:3100/api/v1
    #[arg(long, global = true, env = "HOMEBOX_URL", value_name = "URL")]
    pub base_url: Option<String>,

    #[arg(long, global = true, env = "HOMEBOX_USERNAME")]
    pub username: Option<String>,

    #[arg(long, global = true, env = "HOMEBOX_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Prompt for the password instead of reading it from the file
    #[arg(long, global = true)]
    pub ask_password: bool,

    /// Resolve and validate everything but change nothing on the server
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a single location (skipped if it already exists)
    CreateLocation {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Parent location path, e.g. "Garage/Shelf 2"
        #[arg(long, conflicts_with = "parent_id")]
        parent: Option<String>,
        #[arg(long)]
        parent_id: Option<String>,
    },
    /// Create locations from a name,description,parent CSV
    ImportLocations {
        #[arg(long, value_name = "FILE")]
        csv: PathBuf,
        #[arg(long)]
        ignore_case: bool,
    },
    /// Write all items as CSV (stdout unless --csv is given)
    ExportItems {
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
    },
    /// Update (or create, for rows without an id) items from an export-shaped CSV
    UpdateItems {
        #[arg(long, value_name = "FILE")]
        csv: PathBuf,
        /// Create tags that do not exist yet instead of failing the row
        #[arg(long)]
        create_missing_tags: bool,
        #[arg(long)]
        ignore_case: bool,
    },
    /// List every location with its full path
    ListLocations,
    /// Find locations whose name contains TERM
    SearchLocations {
        term: String,
        #[arg(long, short = 'i')]
        ignore_case: bool,
    },
    /// Print the id of the location at PATH
    ResolveLocation {
        path: String,
        #[arg(long, short = 'i')]
        ignore_case: bool,
    },
    UpdateLocation {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Move under the location at this path
        #[arg(long, conflicts_with = "root")]
        parent: Option<String>,
        /// Move to the top level
        #[arg(long)]
        root: bool,
    },
    DeleteLocation {
        id: String,
        /// Do not ask for confirmation
        #[arg(long, short = 'y')]
        yes: bool,
    },
    ListItems,
    UpdateItem {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        quantity: Option<u32>,
        /// Location path
        #[arg(long)]
        location: Option<String>,
    },
    DeleteItem {
        id: String,
        #[arg(long, short = 'y')]
        yes: bool,
    },
    ListTags,
    CreateTag {
        #[arg(long)]
        name: String,
    },
    DeleteTag {
        id: String,
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `-v`.
pub fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// Resolve credentials, log in, and run the chosen command.
pub fn run(cli: Cli) -> Result<ExitCode> {
    let mut overrides = Overrides {
        base_url: cli.base_url,
        username: cli.username,
        password: cli.password,
    };
    if cli.ask_password {
        overrides.password = Some(ui::prompt_password(overrides.username.as_deref())?);
    }
    let config = Config::load(cli.config.as_deref(), overrides).context("loading credentials")?;
    let client = Client::connect(&config)
        .with_context(|| format!("connecting to {}", config.base_url))?;
    dispatch(&client, cli.command, cli.dry_run)
}

/// Run one command against an open session.
pub fn dispatch<T: Transport>(
    client: &Client<T>,
    command: Command,
    dry_run: bool,
) -> Result<ExitCode> {
    match command {
        Command::CreateLocation {
            name,
            description,
            parent,
            parent_id,
        } => {
            let parent = parent.map(ParentRef::Path).or(parent_id.map(ParentRef::Id));
            if dry_run {
                if let Some(ParentRef::Path(path)) = &parent {
                    client.location_tree()?.resolve(path, false)?;
                }
                info!(name = %name, parent = ?parent, "dry run: would create location");
                return Ok(ExitCode::SUCCESS);
            }
            let ensured = client.ensure_location(&name, &description, parent.as_ref())?;
            let label = match ensured {
                Ensured::Created(_) => "created",
                Ensured::Existing(_) => "exists",
            };
            println!("{label}\t{}", ensured.location().id);
        }
        Command::ImportLocations { csv, ignore_case } => {
            let options = BatchOptions {
                dry_run,
                ignore_case,
                ..BatchOptions::default()
            };
            let input = open(&csv)?;
            let progress = ui::BatchProgress::new("locations");
            let report = bulk::import_locations(client, input, options, |p| progress.observe(p))?;
            progress.finish();
            return Ok(finish_batch(&report));
        }
        Command::ExportItems { csv } => {
            let rows = match csv {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("creating {}", path.display()))?;
                    bulk::export_items(client, BufWriter::new(file))?
                }
                None => bulk::export_items(client, io::stdout().lock())?,
            };
            info!(rows, "export finished");
        }
        Command::UpdateItems {
            csv,
            create_missing_tags,
            ignore_case,
        } => {
            let options = BatchOptions {
                dry_run,
                ignore_case,
                tags: if create_missing_tags {
                    TagPolicy::Create
                } else {
                    TagPolicy::Reject
                },
            };
            let input = open(&csv)?;
            let progress = ui::BatchProgress::new("items");
            let report = bulk::update_items(client, input, options, |p| progress.observe(p))?;
            progress.finish();
            return Ok(finish_batch(&report));
        }
        Command::ListLocations => ui::print_locations(&client.location_tree()?)?,
        Command::SearchLocations { term, ignore_case } => {
            let tree = client.location_tree()?;
            for location in tree.search(&term, ignore_case) {
                println!("{}\t{}", location.id, tree.path_of(&location.id)?);
            }
        }
        Command::ResolveLocation { path, ignore_case } => {
            let tree = client.location_tree()?;
            println!("{}", tree.resolve(&path, ignore_case)?.id);
        }
        Command::UpdateLocation {
            id,
            name,
            description,
            parent,
            root,
        } => {
            let tree = client.location_tree()?;
            let current = tree
                .get(&id)
                .ok_or_else(|| crate::Error::not_found("location", id.as_str()))?;
            let parent_id = match (parent, root) {
                (_, true) => None,
                (Some(path), false) => Some(tree.resolve(&path, false)?.id.clone()),
                (None, false) => current.parent_id.clone(),
            };
            let update = LocationUpdate {
                id: id.clone(),
                name: name.unwrap_or_else(|| current.name.clone()),
                description: description.unwrap_or_else(|| current.description.clone()),
                parent_id,
            };
            if dry_run {
                info!(id = %id, "dry run: would update location");
            } else {
                client.update_location(&update)?;
                println!("updated\t{id}");
            }
        }
        Command::DeleteLocation { id, yes } => {
            if proceed(&format!("Delete location {id}?"), yes, dry_run)? {
                client.delete_location(&id)?;
                println!("deleted\t{id}");
            }
        }
        Command::ListItems => {
            let tree = client.location_tree()?;
            ui::print_items(&client.get_items()?, &tree)?;
        }
        Command::UpdateItem {
            id,
            name,
            description,
            quantity,
            location,
        } => {
            let location_id = match location {
                Some(path) => Some(client.location_tree()?.resolve(&path, false)?.id.clone()),
                None => None,
            };
            let fields = ItemUpdate {
                name,
                description,
                quantity,
                location_id,
                tag_ids: None,
            };
            if fields.is_empty() {
                bail!("nothing to update: pass --name, --description, --quantity or --location");
            }
            if dry_run {
                info!(id = %id, "dry run: would update item");
            } else {
                client.update_item(&id, &fields)?;
                println!("updated\t{id}");
            }
        }
        Command::DeleteItem { id, yes } => {
            if proceed(&format!("Delete item {id}?"), yes, dry_run)? {
                client.delete_item(&id)?;
                println!("deleted\t{id}");
            }
        }
        Command::ListTags => ui::print_tags(&client.get_tags()?),
        Command::CreateTag { name } => {
            if dry_run {
                info!(name = %name, "dry run: would create tag");
            } else {
                let tag = client.create_tag(&name)?;
                println!("created\t{}", tag.id);
            }
        }
        Command::DeleteTag { id, yes } => {
            if proceed(&format!("Delete tag {id}?"), yes, dry_run)? {
                client.delete_tag(&id)?;
                println!("deleted\t{id}");
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn proceed(prompt: &str, yes: bool, dry_run: bool) -> Result<bool> {
    if dry_run {
        info!("dry run: {prompt} (not asked, nothing deleted)");
        return Ok(false);
    }
    if yes {
        return Ok(true);
    }
    ui::confirm(prompt)
}

fn finish_batch(report: &BatchReport) -> ExitCode {
    ui::print_report(report);
    if report.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

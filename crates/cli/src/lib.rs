use anyhow::{bail, Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use random_tables_engine::{
    command_id, command_name, load_settings, save_settings, ActiveView, BufferEditor,
    ChangeSource, FsVault, Host, ManualChangeSource, MemoryActionRegistry, NotifyChangeSource,
    PluginLifecycle, RandomTablesPlugin, ReloadConfig, ReloadRequest, SeparatorAfterInsert,
    StaticWorkspace, Table,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "random-tables")]
#[command(about = "Roll on random tables kept in markdown notes", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Vault directory (defaults to current directory)
    #[arg(long, global = true, default_value = ".")]
    vault: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the tables found in the table folder
    Tables(TablesArgs),

    /// Insert random items from one table and print them
    Roll(RollArgs),

    /// Keep table commands in sync with the vault until Ctrl-C
    Watch(WatchArgs),

    /// Show or update persisted settings
    Config(ConfigArgs),
}

#[derive(Args)]
struct FolderOverride {
    /// Read tables from this folder for this run only (`/` is the vault root)
    #[arg(long)]
    folder: Option<String>,
}

#[derive(Args)]
struct TablesArgs {
    #[command(flatten)]
    folder: FolderOverride,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct RollArgs {
    /// Command id, e.g. `loot-gems` or `names-rtnakedlist`
    id: String,

    /// How many items to insert
    #[arg(long, short = 'n', default_value_t = 1)]
    count: usize,

    #[command(flatten)]
    folder: FolderOverride,
}

#[derive(Args)]
struct WatchArgs {
    #[command(flatten)]
    folder: FolderOverride,
}

#[derive(Args)]
struct ConfigArgs {
    /// Save a new table folder
    #[arg(long)]
    folder: Option<String>,

    /// Save what follows an inserted item: none, space or newline
    #[arg(long)]
    separator: Option<SeparatorAfterInsert>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TableListing {
    id: String,
    name: String,
    #[serde(flatten)]
    table: Table,
}

pub async fn main_entry() -> Result<()> {
    let mut cli = Cli::parse();

    // Keep stdout clean for JSON output
    if matches!(&cli.command, Commands::Tables(args) if args.json) {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let vault = Arc::new(
        FsVault::new(&cli.vault)
            .with_context(|| format!("Invalid vault path {}", cli.vault.display()))?,
    );

    match cli.command {
        Commands::Tables(args) => run_tables(vault, args).await?,
        Commands::Roll(args) => run_roll(vault, args).await?,
        Commands::Watch(args) => run_watch(vault, args).await?,
        Commands::Config(args) => run_config(vault, args).await?,
    }

    Ok(())
}

struct Session {
    plugin: RandomTablesPlugin,
    actions: Arc<MemoryActionRegistry>,
    editor: Arc<BufferEditor>,
}

/// Load the plugin against `vault` with in-memory actions and editor.
async fn open_session(
    vault: Arc<FsVault>,
    changes: Option<Arc<dyn ChangeSource>>,
    folder: &FolderOverride,
) -> Result<Session> {
    let actions = Arc::new(MemoryActionRegistry::new());
    let editor = Arc::new(BufferEditor::new());
    let workspace = Arc::new(StaticWorkspace::with_view(ActiveView::markdown(
        editor.clone(),
    )));
    let changes: Arc<dyn ChangeSource> = match changes {
        Some(changes) => changes,
        None => Arc::new(ManualChangeSource::new()),
    };
    let host = Host {
        documents: vault.clone(),
        storage: vault,
        actions: actions.clone(),
        workspace,
        changes,
    };

    let plugin = RandomTablesPlugin::new(host, ReloadConfig::default());
    plugin.on_load().await.context("Failed to load tables")?;
    if let Some(folder) = &folder.folder {
        plugin
            .reload(ReloadRequest::Folder(folder.clone()))
            .await
            .with_context(|| format!("Failed to load tables from '{folder}'"))?;
    }

    Ok(Session {
        plugin,
        actions,
        editor,
    })
}

async fn run_tables(vault: Arc<FsVault>, args: TablesArgs) -> Result<()> {
    let session = open_session(vault, None, &args.folder).await?;
    let tables = session.plugin.tables().await;
    session.plugin.on_unload().await;

    if args.json {
        let listings: Vec<TableListing> = tables
            .into_iter()
            .map(|table| TableListing {
                id: command_id(&table),
                name: command_name(&table),
                table,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listings)?);
        return Ok(());
    }

    if tables.is_empty() {
        eprintln!("No tables found");
        return Ok(());
    }
    for table in &tables {
        println!(
            "{}\t{}\t{} items",
            command_id(table),
            command_name(table),
            table.items.len()
        );
    }
    Ok(())
}

async fn run_roll(vault: Arc<FsVault>, args: RollArgs) -> Result<()> {
    let session = open_session(vault, None, &args.folder).await?;

    let mut missing = false;
    for _ in 0..args.count {
        if !session.actions.execute(&args.id, None) {
            missing = true;
            break;
        }
    }
    session.plugin.on_unload().await;

    if missing {
        bail!("No table command '{}' (see `random-tables tables`)", args.id);
    }
    println!("{}", session.editor.contents());
    Ok(())
}

async fn run_watch(vault: Arc<FsVault>, args: WatchArgs) -> Result<()> {
    let config = ReloadConfig::default();
    let changes: Arc<dyn ChangeSource> = Arc::new(
        NotifyChangeSource::start(&vault, config.notify_poll_interval)
            .context("Failed to watch the vault")?,
    );
    let root = vault.root().display().to_string();
    let session = open_session(vault, Some(changes), &args.folder).await?;
    log::info!(
        "Watching '{}' in {root}; press Ctrl-C to stop",
        session.plugin.settings().folder_location
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    session.plugin.on_unload().await;
    Ok(())
}

async fn run_config(vault: Arc<FsVault>, args: ConfigArgs) -> Result<()> {
    let mut settings = load_settings(vault.as_ref()).await;
    let changed = args.folder.is_some() || args.separator.is_some();
    if let Some(folder) = args.folder {
        settings.folder_location = folder;
    }
    if let Some(separator) = args.separator {
        settings.separator_after_insert = separator;
    }
    if changed {
        save_settings(vault.as_ref(), &settings)
            .await
            .context("Failed to save settings")?;
        log::info!("Saved settings to {}", vault.settings_path().display());
    }

    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

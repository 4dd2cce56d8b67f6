//! Timber Daemon
//!
//! Serves permission-scoped file listings and log tails, and doubles as the
//! command-line client for a running server.

use std::io::{BufRead, IsTerminal};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use protocol::{Credentials, FileNode, NodeKind};
use timber::access::PasswordDigest;
use timber::config::{default_config_path, Config};
use timber::{Client, Server, ServerState};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable consulted when `--password` is not given.
const PASSWORD_ENV: &str = "TIMBER_PASSWORD";

/// Timber - permission-scoped remote file browser and log tailer.
#[derive(Parser, Debug)]
#[command(name = "timberd")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the server
    Serve,

    /// Show the authenticated identity and its access patterns
    Me(ClientArgs),

    /// Check whether a path may be read
    Check {
        #[command(flatten)]
        client: ClientArgs,

        /// Path to check
        path: String,
    },

    /// List every accessible entry
    Ls {
        #[command(flatten)]
        client: ClientArgs,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the first lines of a file
    Head {
        #[command(flatten)]
        client: ClientArgs,

        /// File to read
        path: String,

        /// Number of lines (default: 10)
        #[arg(short = 'n', long)]
        lines: Option<i64>,
    },

    /// Print the last lines of a file
    Tail {
        #[command(flatten)]
        client: ClientArgs,

        /// File to read
        path: String,

        /// Number of lines (default: 10)
        #[arg(short = 'n', long)]
        lines: Option<i64>,

        /// Keep printing appended data
        #[arg(short, long)]
        follow: bool,
    },

    /// Print a whole file
    Cat {
        #[command(flatten)]
        client: ClientArgs,

        /// File to read
        path: String,
    },

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Connection options shared by the client commands.
#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Server address (defaults to the configured listen address)
    #[arg(short, long, value_name = "ADDR")]
    pub server: Option<String>,

    /// User name
    #[arg(short, long)]
    pub user: String,

    /// Password (falls back to TIMBER_PASSWORD, then a prompt on stdin)
    #[arg(short, long)]
    pub password: Option<String>,
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Write a starter configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration with passwords hashed
    Show,

    /// Print the sha256 form of a password for the configuration file
    HashPassword {
        /// Password to hash (read from stdin when omitted)
        password: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    match cli.command {
        Commands::Serve => {
            let mut config = Config::load(&config_path)?;
            config.apply_env_overrides();
            config.validate()?;

            let level = if cli.verbose {
                "debug"
            } else {
                config.daemon.log_level.as_str()
            };
            let _guard = init_logging(level, config.daemon.log_file.as_deref())?;
            tracing::info!("Using config file: {:?}", config_path);

            serve(config).await?;
        }
        Commands::Config(command) => {
            init_logging(if cli.verbose { "debug" } else { "warn" }, None)?;
            run_config_command(command, &config_path)?;
        }
        command => {
            init_logging(if cli.verbose { "debug" } else { "warn" }, None)?;
            let mut config = Config::load(&config_path)?;
            config.apply_env_overrides();
            run_client_command(command, &config).await?;
        }
    }

    Ok(())
}

/// Install the tracing subscriber. The returned guard must be held for the
/// life of the process when logging to a file.
fn init_logging(level: &str, log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let Some(path) = log_file else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
        return Ok(None);
    };

    let file_name = path
        .file_name()
        .with_context(|| format!("log_file must name a file: {}", path.display()))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

    let appender = tracing_appender::rolling::daily(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();
    Ok(Some(guard))
}

/// Run the server until SIGTERM or SIGINT.
async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = config.server.listen_addr()?;
    let state = ServerState::from_config(&config)?;
    let server = Server::bind(addr, state)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(addr = %server.local_addr()?, "Timber daemon started");
    let shutdown = server.shutdown_token();
    let handle = tokio::spawn(server.run());

    wait_for_shutdown_signal().await?;
    tracing::info!("Received shutdown signal");

    shutdown.cancel();
    handle.await.context("server task panicked")??;
    tracing::info!("Timber daemon stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
    Ok(())
}

fn run_config_command(command: ConfigCommands, path: &Path) -> anyhow::Result<()> {
    match command {
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                bail!(
                    "Config file already exists: {} (use --force to overwrite)",
                    path.display()
                );
            }
            let mut contents = String::from(CONFIG_HEADER);
            contents.push_str(&Config::example().to_toml()?);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(path, contents)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
            println!("The sample user 'admin' has password 'change-me'.");
        }
        ConfigCommands::Show => {
            let mut config = Config::load(path)?;
            config.apply_env_overrides();
            for user in &mut config.users {
                if let Ok(digest) = PasswordDigest::parse(&user.password) {
                    user.password = digest.to_config_value();
                }
            }
            println!("# {}", path.display());
            print!("{}", config.to_toml()?);
        }
        ConfigCommands::HashPassword { password } => {
            let password = match password {
                Some(p) => p,
                None => read_secret("Password: ")?,
            };
            if password.is_empty() {
                bail!("Password must not be empty");
            }
            println!("{}", PasswordDigest::of(&password).to_config_value());
        }
    }
    Ok(())
}

const CONFIG_HEADER: &str = "\
# Timber configuration
#
# Users: table form ([[users]] name/password/access) or compact strings
#   users = [\"alice:secret@logs,app\"]
# Passwords may be plain text or sha256:<hex> (see `timberd config hash-password`).
#
# Access groups map a name to glob patterns. Wildcards match within a single
# path segment; `..` is always rejected.

";

async fn run_client_command(command: Commands, config: &Config) -> anyhow::Result<()> {
    match command {
        Commands::Me(args) => {
            let mut client = connect(&args, config).await?;
            let info = client.me().await?;
            println!("{}", info.name);
            for pattern in &info.access {
                println!("  {}", pattern);
            }
        }
        Commands::Check { client: args, path } => {
            let mut client = connect(&args, config).await?;
            if client.check(&path).await? {
                println!("allowed: {}", path);
            } else {
                println!("denied: {}", path);
                std::process::exit(1);
            }
        }
        Commands::Ls { client: args, json } => {
            let mut client = connect(&args, config).await?;
            let nodes = client.list().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&nodes)?);
            } else if nodes.is_empty() {
                println!("No accessible files");
            } else {
                print_tree(&nodes, 0);
            }
        }
        Commands::Head {
            client: args,
            path,
            lines,
        } => {
            let client = connect(&args, config).await?;
            let mut stream = client.head(&path, lines).await?;
            stream.copy_to(&mut tokio::io::stdout()).await?;
        }
        Commands::Tail {
            client: args,
            path,
            lines,
            follow,
        } => {
            let client = connect(&args, config).await?;
            let mut stream = client.tail(&path, lines, follow).await?;
            let mut stdout = tokio::io::stdout();
            tokio::select! {
                result = stream.copy_to(&mut stdout) => { result?; }
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        Commands::Cat { client: args, path } => {
            let client = connect(&args, config).await?;
            let mut stream = client.cat(&path).await?;
            stream.copy_to(&mut tokio::io::stdout()).await?;
        }
        Commands::Serve | Commands::Config(_) => {
            anyhow::bail!("not a client command")
        }
    }
    Ok(())
}

async fn connect(args: &ClientArgs, config: &Config) -> anyhow::Result<Client> {
    let server = match &args.server {
        Some(server) => server.clone(),
        None => client_address(config)?.to_string(),
    };
    let password = match &args.password {
        Some(p) => p.clone(),
        None => match std::env::var(PASSWORD_ENV) {
            Ok(p) if !p.is_empty() => p,
            _ => read_secret("Password: ")?,
        },
    };

    Client::connect(server.as_str(), Credentials::new(args.user.clone(), password))
        .await
        .with_context(|| format!("Failed to connect to {}", server))
}

/// The configured listen address, with a wildcard IP replaced by loopback.
fn client_address(config: &Config) -> anyhow::Result<SocketAddr> {
    let mut addr = config.server.listen_addr()?;
    if addr.ip().is_unspecified() {
        addr.set_ip(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
    Ok(addr)
}

/// Read one line from stdin, prompting on stderr when interactive.
fn read_secret(prompt: &str) -> anyhow::Result<String> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        eprint!("{}", prompt);
    }
    let mut line = String::new();
    stdin
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn print_tree(nodes: &[FileNode], depth: usize) {
    for node in nodes {
        let suffix = if node.kind == NodeKind::Dir { "/" } else { "" };
        println!(
            "{:indent$}{}{}  ({})",
            "",
            node.name,
            suffix,
            format_size(node.size),
            indent = depth * 2
        );
        print_tree(&node.children, depth + 1);
    }
}

/// Format a byte count in human-readable form.
fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

//! Command-line client for the authentication API. Each subcommand performs
//! one call and prints either its result or a single error line.
use std::path::{Path, PathBuf};

use anyhow::Context;
use authui::{
    auth::request::{LoginRequest, RegisterRequest},
    config::{config_file_path, token_file_path, Settings},
    ApiClient, AuthApi, FileTokenStore, Session,
};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "authui")]
#[command(about = "Register, log in and call protected routes of an authentication API")]
#[command(version)]
struct Cli {
    /// Base URL of the API, overriding the config file and AUTHUI_BASE_URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new account
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "AUTHUI_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Log in and store the returned token
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "AUTHUI_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Show the profile of the logged in user
    Me,
    /// Call the admin ping probe
    Admin,
    /// Forget the stored token
    Logout,
    /// Report whether a token is stored
    Status,
}

/// Installs the global subscriber. Logs go to stderr unless a log directory
/// is configured, in which case they roll over daily in that directory. The
/// returned guard must be held until exit so buffered lines get flushed.
fn init_logging(verbose: u8, log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let default_filter = match verbose {
        0 => "authui=warn",
        1 => "authui=info",
        _ => "authui=debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "authui.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .finish();

            tracing::subscriber::set_global_default(subscriber)
                .context("failed to set global default")?;

            Ok(Some(guard))
        }
        None => {
            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .finish();

            tracing::subscriber::set_global_default(subscriber)
                .context("failed to set global default")?;

            Ok(None)
        }
    }
}

/// Runs a single command and returns the text to show on success.
async fn run(command: Command, api: &AuthApi) -> anyhow::Result<String> {
    let output = match command {
        Command::Register {
            username,
            email,
            password,
        } => {
            let res = api
                .register(&RegisterRequest {
                    username,
                    email,
                    password,
                })
                .await?;

            res.message
        }
        Command::Login { username, password } => {
            api.login(&LoginRequest { username, password }).await?;

            "Login OK. Token saved.".to_owned()
        }
        Command::Me => {
            let user = api.me().await?;

            serde_json::to_string_pretty(&user).context("failed to render profile")?
        }
        Command::Admin => api.admin_ping().await?.message,
        Command::Logout => {
            api.logout()?;

            "Logged out.".to_owned()
        }
        Command::Status => {
            if api.status()? {
                "token stored".to_owned()
            } else {
                "no token".to_owned()
            }
        }
    };

    Ok(output)
}

/// Maps a command result to the exit code and the line to print: the output
/// on stdout, or the error banner on stderr.
fn outcome(result: anyhow::Result<String>) -> (i32, String) {
    match result {
        Ok(output) => (0, output),
        Err(err) => (1, format!("error: {err:#}")),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // determine config file paths and load config items
    let (settings, token_path) = match load(cli.base_url) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    };

    // setup logging
    let guard = match init_logging(cli.verbose, settings.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    };

    debug!("base url: {:?}", settings.base_url);
    debug!("auth token path: {:?}", token_path);

    let session = Session::new(FileTokenStore::new(token_path));
    let result = match ApiClient::with_timeout(&settings.base_url, session, settings.timeout()) {
        Ok(client) => run(cli.command, &AuthApi::new(client)).await,
        Err(err) => Err(anyhow::Error::new(err).context("failed to build the http client")),
    };

    let (code, line) = outcome(result);

    if code == 0 {
        println!("{line}");
    } else {
        eprintln!("{line}");
    }

    drop(guard);
    std::process::exit(code);
}

/// Reads settings and resolves where the token lives. A `--base-url` flag wins
/// over every other source.
fn load(base_url: Option<String>) -> anyhow::Result<(Settings, PathBuf)> {
    let config_path = config_file_path().context("couldn't find the config path")?;
    let token_path = token_file_path().context("couldn't find the data path")?;
    let mut settings = Settings::load(&config_path).context("failed to load config file")?;

    settings.override_base_url(base_url);

    Ok((settings, token_path))
}

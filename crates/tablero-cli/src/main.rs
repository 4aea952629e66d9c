// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod export;
mod runtime;

use anyhow::{Context, Result, anyhow, bail};
use config::Config;
use runtime::{ApiRuntime, DemoRuntime};
use std::env;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use tablero_api::{ApiError, Client};
use tablero_app::{AppState, LoginForm, QueryParser};
use tablero_db::Store;
use tablero_tui::SessionOutcome;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "TABLERO_LOG";
const PASSWORD_ENV: &str = "TABLERO_PASSWORD";
const DEMO_SEED: u64 = 2026;

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `tablero --print-example-config` to generate a v1 template",
            options.config_path.display()
        )
    })?;
    let parser = QueryParser::new(config.field_schema());

    if let Some(query) = &options.query {
        let parsed = parser
            .parse(query)
            .map_err(|error| anyhow!("search syntax error: {error}"))?;
        println!("{parsed}");
        return Ok(());
    }

    let db_path = if options.demo {
        PathBuf::from(":memory:")
    } else {
        config.db_path()?
    };
    if options.print_db_path {
        println!("{}", db_path.display());
        return Ok(());
    }

    let log_path = init_logging(&config)?;
    tracing::info!(
        config = %options.config_path.display(),
        db = %db_path.display(),
        log = %log_path.display(),
        "starting tablero"
    );

    let store = if options.demo {
        Store::open_memory()?
    } else {
        Store::open(&db_path).with_context(|| {
            format!(
                "open database {} -- if this path is wrong, set [storage].db_path or TABLERO_DB_PATH",
                db_path.display()
            )
        })?
    };
    store.bootstrap()?;

    if options.logout {
        store.clear_session()?;
        println!("signed out; stored token and saved search cleared");
        return Ok(());
    }

    let client = Client::new(config.base_url(), config.timeout()?).with_context(|| {
        format!(
            "invalid [api] config in {}; fix base_url/timeout values",
            options.config_path.display()
        )
    })?;
    let export_dir = config.export_dir()?;
    let dashboard = config.dashboard_options()?;
    if options.check_only {
        return Ok(());
    }

    let mut state = AppState::default();
    let outcome = if options.demo {
        let mut runtime = DemoRuntime::new(&store, DEMO_SEED, parser, export_dir);
        tablero_tui::run_app(&mut state, &mut runtime, dashboard)?
    } else {
        let (client, label) = resolve_session(client, &store, options.user.as_deref())?;
        let mut runtime = ApiRuntime::new(client, &store, parser, export_dir, label);
        tablero_tui::run_app(&mut state, &mut runtime, dashboard)?
    };

    match outcome {
        SessionOutcome::Quit => Ok(()),
        SessionOutcome::LoggedOut => {
            println!("signed out");
            Ok(())
        }
        SessionOutcome::Expired => {
            bail!("session expired -- run `tablero --user <name>` to sign in again")
        }
    }
}

/// Logs in with `--user`, or reuses the stored token after checking it
/// still belongs to an admin.
fn resolve_session(mut client: Client, store: &Store, user: Option<&str>) -> Result<(Client, String)> {
    if let Some(user) = user {
        let form = LoginForm {
            username: user.to_owned(),
            password: read_password(user)?,
        };
        form.validate()?;
        let session = client.login(&form.username, &form.password)?;
        store.put_access_token(&session.token)?;
        let label = session
            .profile
            .display_name()
            .unwrap_or(&form.username)
            .to_owned();
        return Ok((client, label));
    }

    let Some(token) = store.get_access_token()? else {
        bail!("no stored session -- run `tablero --user <name>` to sign in");
    };
    client.set_token(&token);
    match client.me() {
        Ok(profile) if profile.is_admin() => {
            let label = profile.display_name().unwrap_or("admin").to_owned();
            Ok((client, label))
        }
        Ok(profile) => {
            store.clear_session()?;
            Err(ApiError::AccessDenied { role: profile.rol }.into())
        }
        Err(error) if ApiError::is_unauthorized(&error) => {
            store.clear_session()?;
            bail!("stored session expired -- run `tablero --user <name>` to sign in again")
        }
        Err(error) => Err(error),
    }
}

fn read_password(user: &str) -> Result<String> {
    if let Ok(password) = env::var(PASSWORD_ENV) {
        return Ok(password);
    }

    eprint!("password for {user}: ");
    io::stderr().flush().context("flush password prompt")?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

/// The dashboard owns the terminal, so events go to a file.
fn init_logging(config: &Config) -> Result<PathBuf> {
    let path = config.log_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log file {}", path.display()))?;

    let filter = match EnvFilter::try_from_env(LOG_ENV) {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.log_level()).with_context(|| {
            format!(
                "invalid [logging].level {:?}; use error, warn, info, debug, or trace",
                config.log_level()
            )
        })?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|error| anyhow!("initialize logging: {error}"))?;
    Ok(path)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_db_path: bool,
    demo: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
    logout: bool,
    user: Option<String>,
    query: Option<String>,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        print_db_path: false,
        demo: false,
        print_example: false,
        check_only: false,
        show_help: false,
        logout: false,
        user: None,
        query: None,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--user" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--user requires a username"))?;
                options.user = Some(value.as_ref().to_owned());
            }
            "--query" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--query requires a search expression"))?;
                options.query = Some(value.as_ref().to_owned());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-path" => {
                options.print_db_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--demo" => {
                options.demo = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--logout" => {
                options.logout = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    if options.demo && options.user.is_some() {
        bail!("--demo runs offline and takes no --user; drop one of them");
    }

    Ok(options)
}

fn print_help() {
    println!("tablero: report administration dashboard");
    println!("  --config <path>          Use a specific config path");
    println!("  --user <name>            Sign in (password from {PASSWORD_ENV} or prompt)");
    println!("  --logout                 Forget the stored token and saved search");
    println!("  --query <expr>           Print the query string for a search and exit");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-path             Print resolved database path");
    println!("  --print-example-config   Print a v1 config template");
    println!("  --demo                   Launch against generated reports (offline)");
    println!("  --check                  Validate config + DB + API settings");
    println!("  --help                   Show this help");
}

#[macro_use]
extern crate log;

use usession::{
    common::Settings,
    session::{self, Session},
};

use structopt::StructOpt;
use dotenv::dotenv;
use std::process;
use std::sync::Arc;

/// The `Command` enum represents the various commands that the usession CLI can execute.
#[derive(StructOpt, Debug)]
#[structopt(name = "usession-cli-commands")]
enum Command {
    /// Lists all sessions known to the session manager
    List,

    /// Shows the attributes of a session
    Show {
        /// Session id, the session of the CLI itself when omitted
        #[structopt(short, long)]
        session: Option<String>,

        /// Prints the attributes as JSON
        #[structopt(long)]
        json: bool,
    },

    /// Prints an environment variable as seen by the processes of a session
    Getenv {
        /// Session id, the session of the CLI itself when omitted
        #[structopt(short, long)]
        session: Option<String>,

        /// Name of the variable
        name: String,
    },
}

/// Command-line options for the usession CLI.
#[derive(StructOpt, Debug)]
#[structopt(name = "usession-cli-options")]
struct Opt {
    /// Path to the configuration file.
    #[structopt(short, long, default_value = "")]
    config: String,

    #[structopt(subcommand)]
    command: Command,
}

fn main() {
    dotenv().ok();

    let opt = Opt::from_args();

    let settings = match Settings::new(&opt.config) {
        Ok(settings) => settings,
        Err(error) => {
            eprintln!("Failed to load settings: {}", error);
            process::exit(1);
        }
    };

    if let Err(error) = setup_logging(&settings) {
        eprintln!("Failed to initialize logging: {}", error);
        process::exit(1);
    }

    if !settings.verify() {
        error!("Settings are not valid");
        process::exit(1);
    }

    let result = match opt.command {
        Command::List => list(&settings),
        Command::Show { session, json } => show(&settings, session, json),
        Command::Getenv { session, name } => getenv(&settings, session, &name),
    };

    if let Err(error) = result {
        error!("{}", error);
        process::exit(1);
    }
}

fn list(settings: &Settings) -> usession::Result<()> {
    for sid in session::sessions()? {
        let session = session::factory_with(&settings.paths, &sid);
        let state = session.state().map(|state| state.to_string()).unwrap_or_else(|error| {
            warn!("Cant get state of session {}: {}", sid, error);
            "?".to_string()
        });
        println!("{:>8} {:<16} {}", sid, session.to_string(), state);
    }
    Ok(())
}

fn show(settings: &Settings, sid: Option<String>, json: bool) -> usession::Result<()> {
    let session = resolve(settings, sid)?;
    let info = session.info()?;

    if json {
        match serde_json::to_string_pretty(&info) {
            Ok(text) => println!("{}", text),
            Err(error) => error!("Cant serialize session {}: {}", info.id, error),
        }
    } else {
        println!("{}", info);
    }
    Ok(())
}

fn getenv(settings: &Settings, sid: Option<String>, name: &str) -> usession::Result<()> {
    let session = resolve(settings, sid)?;
    let value = session.getenv(name)?;
    if value.is_empty() {
        info!("{} is not set in session {}", name, session.id());
    } else {
        println!("{}", value);
    }
    Ok(())
}

/// Returns the named session, or the session of the CLI when no id is given.
fn resolve(settings: &Settings, sid: Option<String>) -> usession::Result<Arc<dyn Session>> {
    match sid {
        Some(sid) => Ok(session::factory_with(&settings.paths, &sid)),
        None => session::current(&settings.paths)?
            .ok_or_else(|| usession::SessionError::Unsupported("The CLI is not running inside a session, use --session".to_string())),
    }
}

fn setup_logging(settings: &Settings) -> Result<(), fern::InitError> {
    let logging_config = &settings.logging;

    let format_string = logging_config.format.clone();
    let mut base_config = fern::Dispatch::new()
        .format(move |out, message, record| {
            let format = format_string
                .as_deref()
                .unwrap_or("[{timestamp}][{level}] {message}");
            let formatted_message = format
                .replace("{timestamp}", &chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string())
                .replace("{level}", &record.level().to_string())
                .replace("{message}", &message.to_string());
            out.finish(format_args!("{}", formatted_message))
        })
        .level(logging_config.level.parse::<log::LevelFilter>().unwrap_or(log::LevelFilter::Info));

    // Logs on stderr, command output on stdout.
    if logging_config.console.unwrap_or(true) {
        base_config = base_config.chain(std::io::stderr());
    }

    base_config.apply()?;
    Ok(())
}

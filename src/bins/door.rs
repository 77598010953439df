use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use durins_door::errors::ExplorerError;
use durins_door::explorer::{AddressTranslation, Explorer, ExplorerConfig};
use durins_door::memory::{FileClient, ProcessClient, SharedClient};
use durins_door::ui::cli::CliUi;

use clap::Parser;
use nix::unistd::Pid;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
/// Explore and modify the variables of a program through its debug info
struct Args {
    /// Object file with the DWARF debug info of the program
    #[arg(value_name = "DEBUG_FILE")]
    debug_file: Option<PathBuf>,

    /// File with the memory of the program, like a memory dump
    #[arg(short, long, conflicts_with = "pid")]
    memory_file: Option<PathBuf>,

    /// Running process with the memory of the program
    #[arg(short, long)]
    pid: Option<i32>,

    /// Subtract this offset from every address before accessing memory
    #[arg(short, long, allow_hyphen_values = true, conflicts_with = "offset_from_unit")]
    offset: Option<i64>,

    /// Subtract the low pc of the variable's compile unit from its address
    #[arg(long)]
    offset_from_unit: bool,

    /// Subtract the start of the first mapping of the process from every address
    #[arg(long, requires = "pid", conflicts_with_all = ["offset", "offset_from_unit"])]
    offset_from_base: bool,

    /// Log more, can be given multiple times
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() -> Result<(), ExplorerError> {
    human_panic::setup_panic!();
    let args = Args::parse();
    setup_logger(&args);
    debug!("set up the logger");

    let mut translation = match (args.offset, args.offset_from_unit) {
        (Some(offset), _) => AddressTranslation::Fixed(offset),
        (None, true) => AddressTranslation::CompileUnitLowPc,
        (None, false) => AddressTranslation::Fixed(0),
    };

    let client: Option<SharedClient> = match (&args.memory_file, args.pid) {
        (Some(path), _) => {
            let file: SharedClient = Rc::new(RefCell::new(FileClient::open(path)?));
            Some(file)
        }
        (None, Some(pid)) => {
            let process = ProcessClient::new(Pid::from_raw(pid))?;
            if args.offset_from_base {
                let base = process.base_addr()?;
                info!("process {pid} is mapped at {base}");
                translation = AddressTranslation::Fixed(base.u64() as i64);
            }
            let process: SharedClient = Rc::new(RefCell::new(process));
            Some(process)
        }
        (None, None) => None,
    };

    let ui = CliUi::build()?;
    let mut explorer = Explorer::build(ui, ExplorerConfig { translation });
    if let Some(client) = client {
        explorer.set_client(client);
    }
    if let Some(path) = &args.debug_file {
        explorer.set_debug_file(path)?;
    }
    explorer.run()?;

    Ok(())
}

fn setup_logger(args: &Args) {
    let level = match (args.quiet, args.verbose) {
        (true, _) => tracing::Level::ERROR,
        (false, 0) => tracing::Level::INFO,
        (false, 1) => tracing::Level::DEBUG,
        (false, _) => tracing::Level::TRACE,
    };
    // construct a subscriber that prints formatted traces to stdout
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .without_time()
        .with_file(false)
        .with_target(false)
        .finish();
    // use that subscriber to process traces emitted after this point
    tracing::subscriber::set_global_default(subscriber).expect("could not setup logger");
}

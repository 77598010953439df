use std::cell::RefCell;
use std::path::PathBuf;
use std::process::exit;
use std::rc::Rc;

use durins_door::addr::Addr;
use durins_door::descriptor::TypeDescriptor;
use durins_door::errors::ExplorerError;
use durins_door::explorer::{Explorer, ExplorerConfig};
use durins_door::feedback::{Feedback, VariableView};
use durins_door::memory::{FileClient, SharedClient};
use durins_door::ui::json::{format_feedback, Input, JsonUI};
use durins_door::ui::Status;

use clap::Parser;
use tracing::trace;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about,
    help_template = r#"{about-section}
{usage-heading} {usage}
{all-args}{tab}

{name}: v{version}
Authors: {author-with-newline}
"#
)]
/// Durin's Door Server - JSON interface for exploring debug info
///
/// Provides a JSON-based interface to the explorer, enabling integration with other
/// programs or scripting. Communicates via standard input/output using one JSON
/// document per line for both commands and responses. Logs go to standard error.
struct Args {
    #[arg(long)]
    /// Print example JSON commands and exit
    ///
    /// Displays sample JSON structures for sending commands to the explorer
    example_statuses: bool,

    #[arg(long)]
    /// Print example JSON responses and exit
    ///
    /// Displays sample JSON structures for the responses sent by the explorer
    example_feedbacks: bool,

    #[arg(long)]
    /// Object file with the DWARF debug info to load at startup
    debug_file: Option<PathBuf>,

    #[arg(long)]
    /// File with the memory of the program
    memory_file: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count)]
    /// Log more, can be given multiple times
    verbose: u8,
}

fn main() -> Result<(), ExplorerError> {
    human_panic::setup_panic!();
    let args = Args::parse();
    setup_logger(args.verbose);

    if args.example_statuses {
        example_statuses()?;
        exit(0);
    }
    if args.example_feedbacks {
        example_feedbacks()?;
        exit(0);
    }

    let ui = JsonUI::build()?;
    let mut explorer = Explorer::build(ui, ExplorerConfig::default());
    if let Some(path) = &args.memory_file {
        let client: SharedClient = Rc::new(RefCell::new(FileClient::open(path)?));
        explorer.set_client(client);
    }
    if let Some(path) = &args.debug_file {
        explorer.set_debug_file(path)?;
    }
    explorer.run()?;

    Ok(())
}

fn example_statuses() -> Result<(), ExplorerError> {
    let statuses: &[Status] = &[
        Status::Ping,
        Status::SetDebugFile("./testcase.dwarf".into()),
        Status::ListCompileUnits,
        Status::StepInto("main.cpp".to_string()),
        Status::ListChildren,
        Status::Back,
        Status::GetType("Driver".to_string()),
        Status::ReadVariable(Some("formula_1_teams".to_string())),
        Status::SetVariable(None, vec![0xfe, 0xed, 0xbe, 0xef]),
        Status::GetField("car_number".to_string()),
        Status::SetField("car_number".to_string(), 44),
        Status::SetOffset(-4096),
        Status::Quit,
    ];

    for s in statuses {
        println!(
            "{}",
            serde_json::to_string(&Input { status: s.clone() })?
        )
    }
    Ok(())
}

fn example_feedbacks() -> Result<(), ExplorerError> {
    let driver = TypeDescriptor::new("Driver", 96).with_children(vec![
        TypeDescriptor::new("initials", 8).with_array_ranges(vec![2]),
        TypeDescriptor::new("car_number", 32).with_struct_offset(32),
        TypeDescriptor::new("has_won_wdc", 8).with_struct_offset(64),
    ]);
    let feedbacks: &[Feedback] = &[
        Feedback::Ok,
        Feedback::List(vec!["main.cpp".to_string(), "other.cpp".to_string()]),
        Feedback::Path(vec!["/".to_string(), "main.cpp".to_string()]),
        Feedback::Field(44),
        Feedback::Variable(VariableView {
            name: "hamilton".to_string(),
            address: Addr::from(0x4010u64),
            ty: driver.clone(),
            value: Some("4c48000000002c0001000000".to_string()),
        }),
        Feedback::Type(driver),
        Feedback::Error(ExplorerError::NotFound("mclaren".to_string())),
    ];

    for f in feedbacks {
        println!("{}", serde_json::to_string(&format_feedback(f))?)
    }
    Ok(())
}

fn setup_logger(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    // stdout belongs to the protocol
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .with_file(false)
        .with_target(false)
        .finish();
    // use that subscriber to process traces emitted after this point
    tracing::subscriber::set_global_default(subscriber).expect("could not setup logger");
    trace!("set up the logger");
}

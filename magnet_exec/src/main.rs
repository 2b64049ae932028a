//! # Magnet Executable
//!
//! Controls a vector magnet made of one AMI430 driven superconducting magnet per axis. Requests
//! are either read from a script given on the command line or typed at an interactive console.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use log::{info, warn};
use rustyline::{error::ReadlineError, DefaultEditor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use structopt::StructOpt;

// Internal
use magnet_if::request::Request;
use magnet_lib::{
    cancel::CancelToken,
    clock::{Clock, SystemClock},
    facade::MagnetFacade,
    magnet_worker::MagnetWorker,
    params::MagnetExecParams,
};
use util::{
    logger::{logger_init, LevelFilter},
    script_interpreter::{PendingRequests, ScriptInterpreter},
    session::{self, Session},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const PROMPT: &str = "magnet $ ";

/// Period at which the script is checked for due requests.
const SCRIPT_PERIOD: Duration = Duration::from_millis(100);

const HELP: &str = "\
Requests:
    get <quantity>            read a quantity, e.g. `get radius` or `get x_field`
    set <quantity> [value]    write a quantity, e.g. `set phi 45` or `set z_pause`
    stop                      cancel the running ramp (also Ctrl-C)
    help                      show this message
    quit                      leave (also Ctrl-D)

Vector quantities: radius, phi, theta, constant_radius, constant_phi, constant_theta
Axis quantities: <axis>_<attribute> with attribute one of field, setPoint, current, units,
    rampRate, rampState, pSwitch, persistent, quench, error, ramp, pause, zero";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "magnet_exec", about = "Vector field control of AMI430 driven magnets")]
struct Opt {
    /// Simulate the power supplies rather than connecting to them
    #[structopt(long)]
    sim: bool,

    /// Parameter file, relative to $MAGNET_SW_ROOT/params
    #[structopt(short, long, default_value = "magnet_exec.toml")]
    params: String,

    /// Script to execute instead of starting the console
    #[structopt(parse(from_os_str))]
    script: Option<PathBuf>,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("magnet_exec", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    info!("Magnet Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params = MagnetExecParams::load(&opt.params)
        .wrap_err_with(|| format!("Could not load parameters from \"{}\"", opt.params))?;

    info!("Parameters loaded, geometry {:?}", params.geometry);

    // ---- OPEN MAGNET ----

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let cancel = CancelToken::new();

    let mut facade = if opt.sim {
        open_sim(&params, clock, cancel)?
    } else {
        MagnetFacade::open(&params, clock, cancel).wrap_err("Could not connect to the magnet")?
    };

    facade
        .seed_constants()
        .wrap_err("Could not read the initial field")?;

    let worker = MagnetWorker::start(facade).wrap_err("Could not start the magnet worker")?;

    info!("Initialisation complete\n");

    // ---- MAIN LOOP ----

    let result = match opt.script {
        Some(ref path) => run_script(&worker, path),
        None => run_console(&worker, &session),
    };

    // ---- SHUTDOWN ----

    worker.shutdown().wrap_err("Magnet worker did not stop cleanly")?;
    info!("End of execution");
    session.exit();

    result
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

#[cfg(feature = "sim")]
fn open_sim(
    params: &MagnetExecParams,
    clock: Arc<dyn Clock>,
    cancel: CancelToken,
) -> Result<MagnetFacade> {
    use magnet_lib::{axis_channel::AxisTiming, sim::sim_axes};

    let axes: Vec<_> = params
        .ordered_axes()
        .iter()
        .map(|a| (a.id, 0.0, a.field_rating))
        .collect();

    let (axes, _handles) = sim_axes(&axes, clock.clone(), AxisTiming::from(&params.timing));
    warn!("Using simulated power supplies");

    MagnetFacade::new(params.geometry, axes, params.ramp.clone(), clock, cancel)
        .wrap_err("Could not build the simulated magnet")
}

#[cfg(not(feature = "sim"))]
fn open_sim(
    _params: &MagnetExecParams,
    _clock: Arc<dyn Clock>,
    _cancel: CancelToken,
) -> Result<MagnetFacade> {
    Err(color_eyre::eyre::eyre!(
        "Built without the \"sim\" feature, simulated power supplies are unavailable"
    ))
}

/// Submit requests as they fall due, then wait for every one of them to be answered.
fn run_script(worker: &MagnetWorker, path: &Path) -> Result<()> {
    let mut si = ScriptInterpreter::new(path)
        .wrap_err_with(|| format!("Failed to load script {:?}", path))?;

    info!(
        "Loaded script lasts {:.02} s and contains {} requests\n",
        si.get_duration(),
        si.get_num_requests()
    );

    let mut outstanding = 0usize;

    loop {
        match si.get_pending(session::get_elapsed_seconds()) {
            PendingRequests::None => (),
            PendingRequests::Some(requests) => {
                for r in requests {
                    if r != Request::Stop {
                        outstanding += 1;
                    }
                    worker.submit(r)?;
                }
            }
            PendingRequests::EndOfScript => break,
        }

        while worker.try_recv().is_some() {
            outstanding -= 1;
        }

        thread::sleep(SCRIPT_PERIOD);
    }

    info!(
        "End of script reached, waiting for {} outstanding requests",
        outstanding
    );

    while outstanding > 0 {
        if worker.recv_timeout(SCRIPT_PERIOD)?.is_some() {
            outstanding -= 1;
        }
    }

    Ok(())
}

/// Read requests from the console until the operator quits.
fn run_console(worker: &MagnetWorker, session: &Session) -> Result<()> {
    let mut rl = DefaultEditor::new().wrap_err("Could not start the console")?;

    let history_path = session.session_root.join("history.txt");

    println!("{}\n", HELP);

    loop {
        // Responses are logged by the worker
        while worker.try_recv().is_some() {}

        let line = match rl.readline(PROMPT) {
            Ok(l) => l,
            Err(ReadlineError::Interrupted) => {
                worker.submit(Request::Stop)?;
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e).wrap_err("Console error"),
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Err(e) = rl.add_history_entry(line) {
            warn!("Could not add to history: {}", e);
        }

        match line {
            "help" => println!("{}", HELP),
            "quit" | "exit" => break,
            _ => match Request::parse(line) {
                Ok(r) => worker.submit(r)?,
                Err(e) => println!("{}", e),
            },
        }
    }

    if let Err(e) = rl.save_history(&history_path) {
        warn!("Could not save console history: {}", e);
    }

    Ok(())
}

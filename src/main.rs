mod cli;

use kombi::config;
use kombi::dispatcher::{
    create_dispatcher, dispatchers, execute_aux, DispatchReport, Dispatcher, DispatcherOptions,
    LocalDispatcher, SpoolFarm,
};
use kombi::process::{processes, ChildCommand};
use kombi::reporter::REPORTERS;
use kombi::task::task_kinds;
use kombi::wrapper::{self, wrappers};
use kombi::{input, tools};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, FarmCommands};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Farm job id for `farm exec` when `--job-id` is not given.
const FARM_JOB_ID_ENV: &str = "KOMBI_FARM_JOB_ID";

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "kombi=trace,kombi_element=debug,kombi_template=debug".to_string()
        } else {
            "kombi=info,kombi_element=info,kombi_template=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            let code = e
                .downcast_ref::<kombi::Error>()
                .map(kombi::Error::exit_code)
                .unwrap_or(2);
            ExitCode::from(u8::try_from(code).unwrap_or(2))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let verbose = cli.verbose;
    match cli.command {
        Commands::Run {
            config,
            input,
            dispatcher,
            wait: _,
            no_await,
            reporter,
            strict,
            split_size,
            spool_dir,
        } => {
            let options = DispatcherOptions {
                await_execution: !no_await,
                enable_verbose_output: verbose,
                default_reporter: reporter,
                split_size,
                strict,
                spool_dir,
                ..DispatcherOptions::default()
            };
            run_config(cli.support.as_deref(), &config, &input, &dispatcher, options)
        }
        Commands::ListTypes { json } => list_types(cli.support.as_deref(), json),
        Commands::Validate { config: path } => {
            let path = path.or(cli.support).ok_or_else(|| {
                kombi::Error::config("No resource path given (pass one or use --config)")
            })?;
            validate(&path)
        }
        Commands::ExecJob { job, result } => Ok(wrapper::execute_job(&job, &result)?),
        Commands::Farm { command } => match command {
            FarmCommands::Exec {
                aux,
                range_start,
                range_end,
                job_id,
            } => {
                let job_id = job_id.or_else(|| std::env::var(FARM_JOB_ID_ENV).ok());
                let range = range_start.zip(range_end);
                Ok(execute_aux(&aux, range, job_id.as_deref())?)
            }
            FarmCommands::Drain { dir } => drain(&dir, verbose),
        },
    }
}

/// Load user kinds and procedures from `--config`, or the search path.
fn load_support(path: Option<&Path>) -> Result<config::Resources> {
    let resources = match path {
        Some(path) => config::load(path)?,
        None => config::load_search_path()?,
    };
    Ok(resources)
}

#[cfg(unix)]
fn install_interrupt_handler(cancel: Option<Arc<AtomicBool>>) {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

    extern "C" fn on_signal(_: nix::libc::c_int) {
        INTERRUPTED.store(true, Ordering::SeqCst);
    }

    let action = SigAction::new(
        SigHandler::Handler(on_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only stores to an atomic.
        if let Err(e) = unsafe { sigaction(signal, &action) } {
            tracing::warn!("Failed to install {:?} handler: {}", signal, e);
        }
    }

    std::thread::spawn(move || loop {
        if INTERRUPTED.load(Ordering::SeqCst) {
            tracing::warn!("Interrupted, cancelling running tasks");
            if let Some(cancel) = &cancel {
                cancel.store(true, Ordering::SeqCst);
            }
            processes().cancel_all();
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(100));
    });
}

#[cfg(not(unix))]
fn install_interrupt_handler(_cancel: Option<Arc<AtomicBool>>) {}

fn run_config(
    support: Option<&Path>,
    config_path: &Path,
    input_path: &Path,
    dispatcher_name: &str,
    options: DispatcherOptions,
) -> Result<()> {
    if let Some(path) = support {
        load_support(Some(path))?;
    }
    let resources = config::load(config_path)?;
    if resources.holders.is_empty() {
        anyhow::bail!(kombi::Error::config(format!(
            "{} declares no tasks",
            config_path.display()
        )));
    }
    let elements = input::collect_elements(input_path)?;
    tracing::info!(
        "Running {} task tree(s) over {} element(s) with the {} dispatcher",
        resources.holders.len(),
        elements.len(),
        dispatcher_name
    );

    let mut dispatcher: Box<dyn Dispatcher> = if dispatcher_name == "local" {
        let local = LocalDispatcher::new(options)?;
        install_interrupt_handler(Some(local.cancel_flag()));
        Box::new(local)
    } else {
        install_interrupt_handler(None);
        create_dispatcher(dispatcher_name, options)?
    };

    let mut total = DispatchReport::default();
    for holder in &resources.holders {
        let report = dispatcher.dispatch(holder, &elements)?;
        total.job_ids.extend(report.job_ids);
        total.outputs.extend(report.outputs);
        total.skipped.extend(report.skipped);
    }

    if !total.skipped.is_empty() {
        tracing::warn!("{} element(s) skipped", total.skipped.len());
    }
    if dispatcher.name() == "renderFarm" {
        for id in &total.job_ids {
            println!("Submitted farm job {id}");
        }
    } else {
        tracing::info!(
            "Done: {} job(s), {} output element(s)",
            total.job_ids.len(),
            total.outputs.len()
        );
    }
    Ok(())
}

fn list_types(support: Option<&Path>, as_json: bool) -> Result<()> {
    load_support(support)?;
    let element_kinds: Vec<_> = kombi_element::kinds()
        .names()
        .into_iter()
        .map(|name| {
            let ancestry = kombi_element::kinds().ancestry(&name);
            (name, ancestry)
        })
        .collect();
    let task_names = task_kinds().names();
    let wrapper_names = wrappers().names();

    if as_json {
        let listing = json!({
            "elements": element_kinds
                .iter()
                .map(|(name, ancestry)| json!({"name": name, "ancestry": ancestry}))
                .collect::<Vec<_>>(),
            "tasks": task_names,
            "wrappers": wrapper_names,
            "dispatchers": dispatchers().names(),
            "reporters": REPORTERS,
        });
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("Element kinds:");
    for (name, ancestry) in &element_kinds {
        if ancestry.len() > 1 {
            println!("  {} ({})", name, ancestry[1..].join(" < "));
        } else {
            println!("  {}", name);
        }
    }
    println!("\nTask kinds:");
    for name in &task_names {
        println!("  {}", name);
    }
    println!("\nWrappers: {}", wrapper_names.join(", "));
    println!("Dispatchers: {}", dispatchers().names().join(", "));
    println!("Reporters: {}", REPORTERS.join(", "));
    Ok(())
}

fn validate(path: &Path) -> Result<()> {
    println!("Validating resources: {}", path.display());
    let resources = config::load(path)?;
    println!("✓ Resources are valid");
    println!("  Files: {}", resources.files.len());
    println!("  Task trees: {}", resources.holders.len());
    println!("  Global vars: {}", resources.vars.vars.len());
    println!("  Element kinds: {}", resources.element_kinds.len());
    println!("  Task kinds: {}", resources.task_kinds.len());
    println!("  Procedures: {}", resources.procedures.len());
    Ok(())
}

fn drain(dir: &Path, verbose: bool) -> Result<()> {
    let farm = SpoolFarm::open(dir)?;
    let exe: PathBuf = tools::kombi_executable()?;
    let summary = farm.drain(|job, (start, end)| {
        let mut command = ChildCommand::new(&exe);
        if verbose {
            command = command.arg("--verbose");
        }
        let output = command
            .args(["farm", "exec"])
            .arg(job.aux_path.display().to_string())
            .args(["--range-start".to_string(), start.to_string()])
            .args(["--range-end".to_string(), end.to_string()])
            .args(["--job-id", job.id.as_str()])
            .echo(verbose)
            .run()?;
        if output.success() {
            Ok(())
        } else {
            Err(kombi::Error::WrapperFailed {
                wrapper: "farm".to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    })?;
    println!(
        "Drained {}: {} completed, {} failed, {} run(s)",
        dir.display(),
        summary.completed,
        summary.failed,
        summary.runs
    );
    if summary.failed > 0 {
        anyhow::bail!(kombi::Error::dispatcher(format!(
            "{} farm job(s) failed",
            summary.failed
        )));
    }
    Ok(())
}

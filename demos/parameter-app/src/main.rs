//!
//! This demo serves one node's parameters and drives them from a client on
//! the same bus.
//!
//! The server loads its initial parameters from a YAML file and rejects any
//! `drive.max_speed` above a limit.  The client periodically writes a random
//! speed, reads it back, lists the camera parameters, and writes then deletes
//! a scratch parameter while a subscriber logs every change event.  Ctrl-C
//! shuts the bus down.
//!

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use rand::Rng;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use pcomm::prelude::*;

/// The highest speed the server accepts
const SPEED_LIMIT: f64 = 2.5;

/// PComm parameter demo
#[derive(Parser, Debug)]
#[command(name = "parameter-app")]
#[command(about = "Serve a node's parameters and drive them from a client")]
#[command(version)]
struct Args {
    /// Node id the server answers for
    #[arg(short, long, default_value = "robot1")]
    node_id: String,

    /// YAML file with the node's initial parameters
    #[arg(short, long)]
    params: Option<PathBuf>,

    /// Server worker threads
    #[arg(short, long, default_value = "5")]
    worker_threads: usize,

    /// Client call timeout in milliseconds
    #[arg(short, long, default_value = "1000")]
    timeout_ms: u64,

    /// Delay between client rounds in milliseconds
    #[arg(long, default_value = "500")]
    period_ms: u64,
}

fn validate_speed(parameter: &Parameter) -> Result<(), String> {
    match (parameter.name.as_str(), &parameter.value) {
        ("drive.max_speed", ParameterValue::Double(speed)) if *speed > SPEED_LIMIT => Err(format!(
            "{} exceeds the speed limit of {}",
            speed, SPEED_LIMIT
        )),
        ("drive.max_speed", value) if value.parameter_type() != ParameterType::Double => {
            Err(String::from("drive.max_speed must be a double"))
        }
        _ => Ok(()),
    }
}

fn log_events(events: &mut ParameterEventSubscriber) {
    for event in events.poll_events() {
        for parameter in event.new_parameters.iter() {
            info!(node_id = %event.node_id, name = %parameter.name, value = %parameter.value, "parameter added");
        }
        for parameter in event.changed_parameters.iter() {
            info!(node_id = %event.node_id, name = %parameter.name, value = %parameter.value, "parameter changed");
        }
        for parameter in event.deleted_parameters.iter() {
            info!(node_id = %event.node_id, name = %parameter.name, "parameter deleted");
        }
    }
}

fn run_round(client: &ParameterClient, node_id: &str, timeout: Duration) -> Result<(), ParameterError> {
    let speed: f64 = rand::thread_rng().gen_range(0.0..3.0);
    let response = client.set_parameters_timeout(
        node_id,
        vec![Parameter::new("drive.max_speed", speed)],
        timeout,
    )?;
    for result in response.results.iter().filter(|result| !result.successful) {
        warn!(reason = %result.reason, "speed rejected");
    }

    let current = client.get_parameters_timeout(node_id, &[String::from("drive.max_speed")], timeout)?;
    if let Some(parameter) = current.first() {
        info!(value = %parameter.value, "current max speed");
    }

    let camera = client.list_parameters_filtered(node_id, &[String::from("camera")], 0, timeout)?;
    info!(count = camera.len(), names = ?camera, "camera parameters");

    let scratch = vec![String::from("scratch.round")];
    client.set_parameters_timeout(node_id, vec![Parameter::new("scratch.round", speed)], timeout)?;
    let response = client.delete_parameters_timeout(node_id, &scratch, timeout)?;
    info!(deleted = response.results[0].successful, "scratch parameter cleared");
    Ok(())
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pcomm_parameters=debug"));
    fmt().with_env_filter(filter).with_thread_ids(true).init();

    let args = Args::parse();
    let bus = ParameterBus::new();

    let config = ServerConfig::builder()
        .worker_threads(args.worker_threads)
        .on_set(validate_speed)
        .build();
    let served = match &args.params {
        Some(path) => ParameterServer::serve_from_yaml(&bus, args.node_id.clone(), config, path),
        None => ParameterServer::serve(&bus, args.node_id.clone(), config),
    };
    let server = match served {
        Ok(server) => server,
        Err(err) => {
            error!("failed to start parameter server: {}", err);
            std::process::exit(1);
        }
    };

    let shutdown = bus.clone();
    ctrlc::set_handler(move || {
        info!("received Ctrl-C, shutting down");
        shutdown.shutdown();
    })
    .expect("Error setting Ctrl-C handler");

    let client = match ParameterClient::new(&bus, ClientConfig::default()) {
        Ok(client) => client,
        Err(err) => {
            error!("failed to start parameter client: {}", err);
            std::process::exit(1);
        }
    };
    let mut events = client.subscribe_events();
    let interrupt = bus.interrupt().receiver();
    let timeout = Duration::from_millis(args.timeout_ms);
    let period = Duration::from_millis(args.period_ms);

    while !bus.is_shutdown() {
        log_events(&mut events);
        match run_round(&client, server.node_id(), timeout) {
            Ok(()) => {}
            Err(ParameterError::Cancelled) => break,
            Err(err) => warn!("round failed: {}", err),
        }

        // Wakes early when the bus shuts down.
        let _ = interrupt.recv_timeout(period);
    }

    client.shutdown();
    server.shutdown();
    log_events(&mut events);
}

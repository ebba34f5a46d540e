use bacbridge_client::app::BacnetApp;
use bacbridge_client::signals::device_id;
use bacbridge_client::{
    ClientRuntime, EntityState, HostPlatform, MemoryHost, Publisher, SharedCache, SignalBus,
    SimulatedNetwork,
};
use bacbridge_core::types::{ObjectId, PropertyId};
use bacbridge_core::BacnetValue;
use bacbridge_tools::{BridgeFile, PointTypeArg};
use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "bacnet-simbridge")]
struct Args {
    /// JSON file with `bridge` settings and publisher `mappings`.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Instance of the simulated remote device.
    #[arg(long, default_value_t = 1001)]
    instance: u32,
    /// Address the simulated device answers at.
    #[arg(long, default_value = "10.0.0.5")]
    address: String,
    /// Point type of the simulated objects.
    #[arg(long, value_enum, default_value = "analog-input")]
    point_type: PointTypeArg,
    /// Number of simulated objects.
    #[arg(long, default_value_t = 3)]
    count: u32,
    /// Host entity to publish as `entity_id=value`; repeatable.
    #[arg(long = "entity", value_parser = parse_entity)]
    entities: Vec<(String, String)>,
    /// Seconds to keep the bridge running after import.
    #[arg(long, default_value_t = 0.0)]
    run_secs: f64,
}

fn parse_entity(raw: &str) -> Result<(String, String), String> {
    let (entity_id, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected entity_id=value, got `{raw}`"))?;
    Ok((entity_id.trim().to_string(), value.trim().to_string()))
}

fn present_value(point_type: PointTypeArg, index: u32) -> BacnetValue {
    match point_type {
        PointTypeArg::AnalogInput | PointTypeArg::AnalogOutput | PointTypeArg::AnalogValue => {
            BacnetValue::Real(20.0 + index as f32 * 0.5)
        }
        PointTypeArg::BinaryInput | PointTypeArg::BinaryOutput | PointTypeArg::BinaryValue => {
            BacnetValue::Enumerated(index % 2)
        }
        PointTypeArg::MultiStateValue => BacnetValue::Unsigned(index % 3 + 1),
        PointTypeArg::CharacterStringValue => BacnetValue::CharacterString(format!("text {index}")),
    }
}

fn build_network(args: &Args) -> SimulatedNetwork {
    let sim = SimulatedNetwork::new();
    sim.add_device(args.instance, args.address.clone());
    sim.add_network_port(args.instance, 1, [10, 0, 0, 5], 47808);
    let point_type = args.point_type.into_point_type();
    for index in 0..args.count {
        let object_id = ObjectId::new(point_type.object_type(), index);
        let mut properties = vec![
            (
                PropertyId::ObjectName,
                BacnetValue::CharacterString(format!("{} {index}", point_type.canonical_name())),
            ),
            (PropertyId::PresentValue, present_value(args.point_type, index)),
        ];
        match args.point_type {
            PointTypeArg::MultiStateValue => properties.push((
                PropertyId::StateText,
                BacnetValue::List(
                    ["off", "heat", "cool"]
                        .into_iter()
                        .map(|label| BacnetValue::CharacterString(label.into()))
                        .collect(),
                ),
            )),
            PointTypeArg::AnalogInput | PointTypeArg::AnalogOutput | PointTypeArg::AnalogValue => {
                properties.push((PropertyId::Units, BacnetValue::Enumerated(62)));
            }
            _ => {}
        }
        sim.insert_object(args.instance, object_id, properties);
    }
    sim
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let file = match &args.config {
        Some(path) => BridgeFile::load(path)?,
        None => BridgeFile::default(),
    };

    let sim = Arc::new(build_network(&args));
    let app: Arc<dyn BacnetApp> = sim.clone();
    let cache = Arc::new(SharedCache::new(Arc::new(SignalBus::new())));
    let runtime = ClientRuntime::new("simbridge", Arc::clone(&app), Arc::clone(&cache), file.bridge)?;

    let host = Arc::new(MemoryHost::new());
    for (entity_id, value) in &args.entities {
        host.set_state(EntityState::new(entity_id.as_str(), value.as_str()));
    }
    let host_platform: Arc<dyn HostPlatform> = host.clone();
    let publisher = Publisher::new(app, host_platform, file.mappings);
    let published = publisher.start().await;
    log::info!("published {published} host entit(ies)");

    let devices = runtime.start().await;
    if devices.is_empty() {
        eprintln!("no devices discovered");
        std::process::exit(1);
    }
    if args.run_secs > 0.0 {
        tokio::time::sleep(Duration::from_secs_f64(args.run_secs)).await;
    }

    let mut report = BTreeMap::new();
    for device in cache.devices(runtime.entry_id()).await {
        let points = cache.points(runtime.entry_id(), &device_id(device.instance)).await;
        report.insert(
            device_id(device.instance),
            serde_json::json!({ "device": device, "points": points }),
        );
    }
    let objects: Vec<_> = sim
        .published()
        .iter()
        .map(|object| {
            serde_json::json!({
                "object": object.object_id().to_string(),
                "name": object.object_name(),
                "present_value": object.present_value(),
            })
        })
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "devices": report,
            "published": objects,
            "published_count": published,
        }))?
    );

    publisher.stop().await;
    runtime.shutdown().await;
    Ok(())
}

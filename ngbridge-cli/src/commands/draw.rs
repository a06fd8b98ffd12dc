//! Replay a burst of native change events against attached map views.
//!
//! Events are emitted from a plain thread, the way the native engine
//! calls back, and flow through the dispatcher into the invalidation
//! bridge. The command waits for every view to go idle and then prints
//! what each view actually drew.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Args, ValueEnum};
use tracing::{debug, info};

use ngbridge::bridge::{AuthFailure, AuthFailureNotifier, FeatureSource, InvalidationBridge};
use ngbridge::callback::CallbackRegistry;
use ngbridge::config::BridgeConfig;
use ngbridge::draw::{MapRenderer, MapViewOptions, MapViews};
use ngbridge::native::{Handle, InMemoryFeatures, NotifyBridge, SimulatedRenderer};
use ngbridge::notify::NotificationDispatcher;
use ngbridge::{ChangeCode, Envelope};

use crate::error::CliError;

/// Which change codes the burst contains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum EventPattern {
    /// Only feature creations with known extents (repaint from cache)
    Create,
    /// Only attribute/geometry changes (full refill)
    Change,
    /// Creations, changes, scratch edits and token expiry interleaved
    #[default]
    Mixed,
}

#[derive(Debug, Args)]
pub struct DrawArgs {
    /// Number of change events to emit
    #[arg(long, default_value_t = 50)]
    pub events: usize,

    /// Delay between events in milliseconds
    #[arg(long, default_value_t = 10)]
    pub interval_ms: u64,

    /// Debounce window in milliseconds (default: from config)
    #[arg(long)]
    pub debounce_ms: Option<u64>,

    /// Number of map views to attach
    #[arg(long, default_value_t = 2)]
    pub views: usize,

    /// Event mix
    #[arg(long, value_enum, default_value_t = EventPattern::Mixed)]
    pub pattern: EventPattern,

    /// Simulated render time in milliseconds
    #[arg(long, default_value_t = 50)]
    pub render_ms: u64,
}

const SOURCE: &str = "ngc://store/roads";
const SCRATCH: &str = "ngc://tmp/sketch";

/// The `(uri, code)` pair emitted as event number `index`.
fn event_for(pattern: EventPattern, index: usize) -> (String, ChangeCode) {
    let create = (format!("{}#{}", SOURCE, index), ChangeCode::CREATE_FEATURE);
    let change = (format!("{}#{}", SOURCE, index), ChangeCode::CHANGE_FEATURE);
    match pattern {
        EventPattern::Create => create,
        EventPattern::Change => change,
        EventPattern::Mixed => match index % 10 {
            3 => change,
            5 => (format!("{}#{}", SCRATCH, index), ChangeCode::DELETE_FEATURE),
            9 => ("https://tiles.example.com".to_string(), ChangeCode::TOKEN_EXPIRED),
            _ => create,
        },
    }
}

fn feature_envelope(index: usize) -> Envelope {
    let x = (index % 100) as f64;
    let y = (index / 100) as f64;
    Envelope::new(x, y, x + 1.0, y + 1.0)
}

pub fn run(args: DrawArgs, config: &BridgeConfig) -> Result<(), CliError> {
    if args.views == 0 {
        return Err(CliError::InvalidArgument(
            "--views must be at least 1".to_string(),
        ));
    }
    let debounce = args
        .debounce_ms
        .map(Duration::from_millis)
        .unwrap_or(config.draw.debounce);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("ngbridge-timer")
        .build()
        .map_err(CliError::Runtime)?;

    let registry = Arc::new(CallbackRegistry::new());
    let renderer = Arc::new(
        SimulatedRenderer::new(Arc::clone(&registry))
            .with_steps(5)
            .with_step_delay(Duration::from_millis(args.render_ms / 5)),
    );
    let views = Arc::new(MapViews::new(
        Arc::clone(&registry),
        Arc::clone(&renderer) as Arc<dyn MapRenderer>,
        runtime.handle().clone(),
    ));
    let attached = (0..args.views)
        .map(|i| views.attach(MapViewOptions::new(Handle::new(i as i64 + 1)).with_debounce(debounce)))
        .collect::<Result<Vec<_>, _>>()?;

    let features = Arc::new(InMemoryFeatures::new());
    for index in 0..args.events {
        features.insert(SOURCE, index as i64, feature_envelope(index));
    }

    let dispatcher = Arc::new(NotificationDispatcher::new());
    let bridge = Arc::new(
        InvalidationBridge::new(Arc::clone(&views), Arc::clone(&features) as Arc<dyn FeatureSource>)
            .with_scratch_path(config.notify.scratch_path.clone()),
    );
    let auth = Arc::new(AuthFailureNotifier::new());
    auth.add_handler(Arc::new(|failure: &AuthFailure| {
        info!(url = %failure.url, code = failure.code.bits(), "Authentication event");
    }));
    let _bridge_guard = bridge.attach_to(&dispatcher);
    let _auth_guard = auth.attach_to(&dispatcher);

    println!(
        "Emitting {} events every {}ms into {} view(s), debounce {}ms",
        args.events,
        args.interval_ms,
        args.views,
        debounce.as_millis()
    );

    let started = Instant::now();
    let native = NotifyBridge::new(Arc::clone(&dispatcher));
    let pattern = args.pattern;
    let interval = Duration::from_millis(args.interval_ms);
    let events = args.events;
    let emitter = thread::Builder::new()
        .name("ngbridge-native".to_string())
        .spawn(move || {
            for index in 0..events {
                let (uri, code) = event_for(pattern, index);
                let report = native.on_notify(&uri, code.wire());
                debug!(uri = %uri, delivered = report.delivered, vetoed = report.vetoed, "Event emitted");
                thread::sleep(interval);
            }
        })
        .map_err(CliError::Runtime)?;
    if emitter.join().is_err() {
        return Err(CliError::InvalidArgument(
            "event emitter thread panicked".to_string(),
        ));
    }

    // Idle means nothing pending, queued or rendering on every view.
    let deadline = Instant::now() + debounce + Duration::from_secs(30);
    while Instant::now() < deadline {
        thread::sleep(debounce.min(Duration::from_millis(50)).max(Duration::from_millis(5)));
        if attached.iter().all(|view| view.status().is_idle()) {
            break;
        }
    }

    println!();
    println!("Finished in {:.2}s", started.elapsed().as_secs_f64());
    println!(
        "{:<6} {:<6} {:>9} {:>9} {:>6} {:>8} {:>9}  draws",
        "view", "map", "requested", "coalesced", "fired", "rendered", "cancelled"
    );
    for view in &attached {
        let metrics = view.metrics();
        let draws = renderer
            .draws_for(view.handle())
            .iter()
            .map(|state| state.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{:<6} {:<6} {:>9} {:>9} {:>6} {:>8} {:>9}  {}",
            view.id().to_string(),
            view.handle().to_string(),
            metrics.requested,
            metrics.coalesced,
            metrics.fired,
            metrics.rendered,
            metrics.cancelled,
            draws
        );
    }
    println!(
        "Repainted regions: {}",
        renderer.invalidations().len()
    );

    for view in attached {
        views.detach(view.id())?;
    }
    Ok(())
}

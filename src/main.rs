use breakwater::config::BreakwaterConfig;
use breakwater::{
    init_tracing, Analytics, BreakerEvent, CircuitBreaker, EventPublisher, Fallback, Response,
};
use std::env;
use std::process;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    // Get config file path from command line or use default
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config/breakwater.yaml".to_string());

    // Load configuration
    let config = match BreakwaterConfig::from_file(&config_path).and_then(|cfg| {
        cfg.validate()?;
        Ok(cfg)
    }) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", config_path, e);
            eprintln!("Usage: breakwater [config_file]");
            process::exit(1);
        }
    };

    if let Err(e) = init_tracing(&config.logging) {
        eprintln!("{}", e);
        process::exit(1);
    }

    if let Err(e) = run(config).await {
        eprintln!("Probe error: {}", e);
        process::exit(1);
    }
}

async fn run(config: BreakwaterConfig) -> breakwater::Result<()> {
    let Some(target) = config.target.as_ref() else {
        return Err(breakwater::BreakerError::Config(
            "No target configured".to_string(),
        ));
    };
    let request = target.to_request()?;

    let (events, receiver) = EventPublisher::channel(config.events.capacity);
    let analytics = Arc::new(Analytics::new());

    let breaker = CircuitBreaker::builder(target.url.clone())
        .config(config.breaker.clone())
        .events(events)
        .analytics(analytics.clone())
        .build()?;

    // Log events as they arrive
    let listener = receiver.map(|mut rx| {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    BreakerEvent::StateChanged { breaker, from, to } => {
                        info!(breaker = %breaker, from = %from, to = %to, "State change event");
                    }
                    BreakerEvent::FailureRecorded {
                        breaker,
                        fail_count,
                    } => {
                        info!(breaker = %breaker, fail_count, "Failure event");
                    }
                }
            }
        })
    });

    info!(
        url = %target.url,
        calls = config.probe.calls,
        interval_ms = config.probe.interval_ms,
        "Starting probe"
    );

    let mut interval = tokio::time::interval(config.probe.interval());
    for call in 1..=config.probe.calls {
        interval.tick().await;

        let fallback = Fallback::value(Response::new(200, config.probe.fallback_body.clone()))
            .label("static");
        let result = breaker.call(&request, fallback).await;
        let state = breaker.state().await;
        match result {
            Ok(resp) => info!(call, status = resp.status, state = %state, "Call completed"),
            Err(e) => warn!(call, error = %e, state = %state, "Call failed"),
        }
    }

    // Closing the queue lets the listener drain and exit
    drop(breaker);
    if let Some(handle) = listener {
        let _ = handle.await;
    }

    let report = serde_json::to_string_pretty(&analytics.report())?;
    println!("{}", report);
    Ok(())
}

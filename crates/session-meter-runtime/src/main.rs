//! Session-meter simulation.
//!
//! Drives one scripted meeting through the session actor and logs what the
//! accounting engine reports. Time runs at `TICK_INTERVAL_MS` per simulated
//! second, so `TICK_INTERVAL_MS=10` plays an hour in about 36 seconds.
//!
//! Extra environment variables:
//!
//! - `SIM_USER_ID`: user to simulate (default: "sim-host")
//! - `SIM_TIER`: paid tier; unset runs on the free tier
//! - `SIM_SECONDS`: simulated session length (default: 600)

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use session_meter_core::{
    format_duration, HostContext, MeetingId, SessionEvent, SessionRequest, SystemClock, UserId,
    UserRole,
};
use session_meter_runtime::{MeterConfig, SessionActor};
use session_meter_store::FileStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,session_meter=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MeterConfig::from_env();
    tracing::info!(
        data_dir = %config.data_dir,
        pricing_file = ?config.pricing_file,
        tick_interval_ms = config.tick_interval_ms,
        multiplier_basis = ?config.multiplier_basis,
        "configuration loaded"
    );

    let catalog = Arc::new(config.load_pricing()?);
    let store = Arc::new(FileStore::open(&config.data_dir)?);

    let user_id: UserId = std::env::var("SIM_USER_ID")
        .unwrap_or_else(|_| "sim-host".into())
        .parse()?;
    let tier = std::env::var("SIM_TIER").ok().filter(|s| !s.is_empty());
    let seconds: u64 = std::env::var("SIM_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(600);

    let (handle, task) = SessionActor::spawn(
        &config,
        catalog.clone(),
        store,
        Arc::new(SystemClock),
        user_id.clone(),
    )?;

    let mut events = handle.subscribe();
    let logger = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match &event {
                SessionEvent::FreeTimeWarning {
                    remaining_seconds, ..
                } => tracing::warn!(remaining = %format_duration(*remaining_seconds), "free time running out"),
                SessionEvent::Ended { reason, summary } => tracing::info!(
                    ?reason,
                    duration = %format_duration(summary.duration_seconds),
                    cost = summary.cost,
                    "session ended"
                ),
                other => tracing::info!(event = %serde_json::to_string(other).unwrap_or_default(), "event"),
            }
        }
    });

    if tier.is_some() {
        handle.attach_payment_method().await?;
    }

    let context = HostContext {
        meeting_id: MeetingId::new("sim-meeting")?,
        user_id,
        role: UserRole::Host,
        display_name: "Simulation Host".into(),
    };
    let mut request = SessionRequest::new("en", ["es"])
        .with_context(context)
        .with_participants(40);
    if let Some(tier) = &tier {
        request = request.with_tier(tier.as_str());
    }
    handle.start(request).await?;

    // Script: a participant asks for French a tenth of the way in, the room
    // fills up at a third, and French is dropped at two thirds.
    let step = config.tick_interval();
    for second in 1..=seconds {
        tokio::time::sleep(step).await;
        let result = match second {
            s if s == seconds / 10 => handle.add_language("fr").await.map(|_| ()),
            s if s == seconds / 3 => handle.set_participant_count(180).await.map(|_| ()),
            s if s == seconds * 2 / 3 => handle.remove_language("fr").await.map(|_| ()),
            _ => Ok(()),
        };
        if let Err(e) = result {
            tracing::warn!(second, error = %e, "scripted action refused");
        }

        let Some(snapshot) = handle.snapshot() else {
            break;
        };
        if !snapshot.status.is_live() {
            break;
        }
        if second % 60 == 0 {
            tracing::info!(
                elapsed = %format_duration(snapshot.duration_seconds),
                cost = %catalog.format_cost(snapshot.cost),
                multiplier = snapshot.participant_multiplier,
                "progress"
            );
        }
    }

    match handle.stop().await {
        Ok(summary) => tracing::info!(
            cost = %catalog.format_cost(summary.cost),
            base = %catalog.format_cost(summary.base_cost),
            overage = %catalog.format_cost(summary.overage_cost),
            "final bill"
        ),
        Err(e) => tracing::info!(error = %e, "session already ended"),
    }

    let account = handle.account().await?;
    tracing::info!(
        mode = account.mode.as_str(),
        free_seconds_used = account.daily_free_seconds_used,
        unpaid_cents = account.unpaid_usage_cents,
        lifetime_sessions = account.lifetime_sessions,
        "account"
    );

    handle.shutdown().await?;
    task.await?;
    tokio::time::sleep(Duration::from_millis(10)).await;
    logger.abort();
    Ok(())
}

//! Terminal rendering: the speaking sink stand-in and the live event feed.

use async_trait::async_trait;
use colored::{ColoredString, Colorize};
use navsight_hal::AlertSink;
use navsight_middleware::{EventBus, Topic};
use navsight_types::{Alert, AlertPriority, EventPayload, NavError, NavState};

/// Prints every alert as the line the wearer would hear.
pub struct ConsoleSink;

#[async_trait]
impl AlertSink for ConsoleSink {
    fn id(&self) -> &str {
        "console"
    }

    async fn deliver(&mut self, alert: &Alert) -> Result<(), NavError> {
        println!("  {} {}", priority_badge(alert.priority), alert.message.bold());
        Ok(())
    }
}

pub(crate) fn priority_label(priority: AlertPriority) -> &'static str {
    match priority {
        AlertPriority::Emergency => "STOP",
        AlertPriority::High => "ALERT",
        AlertPriority::Medium => "INFO",
        AlertPriority::Low => "NOTE",
        AlertPriority::Info => "....",
    }
}

fn priority_badge(priority: AlertPriority) -> ColoredString {
    let label = format!("🔊 [{:<5}]", priority_label(priority));
    match priority {
        AlertPriority::Emergency => label.red().bold(),
        AlertPriority::High => label.yellow().bold(),
        AlertPriority::Medium => label.cyan(),
        AlertPriority::Low | AlertPriority::Info => label.dimmed(),
    }
}

fn state_colored(state: NavState) -> ColoredString {
    let s = state.as_str();
    match state {
        NavState::Emergency => s.red().bold(),
        NavState::Alert | NavState::Guidance => s.yellow(),
        NavState::Recover => s.cyan(),
        NavState::Scanning => s.green(),
        NavState::Idle => s.dimmed(),
    }
}

/// Print state changes, guidance and worker faults until the bus closes.
pub async fn follow_events(bus: EventBus) {
    let mut states = bus.subscribe_to(Topic::StateChanges);
    let mut guidance = bus.subscribe_to(Topic::Guidance);
    let mut faults = bus.subscribe_to(Topic::Faults);

    loop {
        let event = tokio::select! {
            e = states.next() => e,
            e = guidance.next() => e,
            e = faults.next() => e,
        };
        let Some(event) = event else { break };
        match event.payload {
            EventPayload::StateChanged(t) => println!(
                "  {} {} → {}",
                "state".dimmed(),
                state_colored(t.from),
                state_colored(t.to)
            ),
            EventPayload::GuidanceIssued(g) => println!(
                "  {} {} ({:.0}%)",
                "guide".dimmed(),
                g.action.tag().cyan(),
                g.confidence * 100.0
            ),
            EventPayload::WorkerFault { worker, message } => {
                println!("  {} {}: {}", "fault".red().bold(), worker, message)
            }
            _ => {}
        }
    }
}

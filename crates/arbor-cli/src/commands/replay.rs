use anyhow::{Context, Result};
use arbor_core::message::IdentityRef;
use arbor_core::notify::{NotificationReceiver, notification_channel};
use arbor_core::{Session, SyncConfig};
use arbor_sync::{ChangeManager, FetchQueue};
use std::collections::BTreeSet;
use std::path::Path;

/// Feeds every line of `file` through a change manager, one turn per line,
/// and prints the notifications each turn delivers as JSON lines.
pub fn run(file: &Path, owner: String, config: SyncConfig) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let (fetcher, mut fetch_requests) = FetchQueue::channel();
    let mut manager = ChangeManager::new(&config).with_fetcher(fetcher);
    let mut session = Session::new(
        IdentityRef {
            id: owner,
            display_name: None,
        },
        config,
    );

    let mut models = session.subscribe_models();
    let mut session_events = session.subscribe_session();
    let (sender, mut entities) = notification_channel();
    let mut observed = BTreeSet::new();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Observe every cached message and container before the turn.
        let ids: Vec<String> = session
            .registry()
            .messages()
            .map(|message| message.id().to_string())
            .chain(
                session
                    .registry()
                    .containers()
                    .map(|container| container.id().to_string()),
            )
            .filter(|id| !observed.contains(id))
            .collect();
        for id in ids {
            session.subscribe(&id, sender.clone());
            observed.insert(id);
        }

        let delivered = manager.handle_text(&mut session, line);
        tracing::debug!(line = index + 1, delivered, "Processed envelope");

        print_notifications(&mut entities)?;
        print_notifications(&mut models)?;
        while let Ok(event) = session_events.try_recv() {
            println!("{}", serde_json::to_string(&event)?);
        }
        while let Ok(request) = fetch_requests.try_recv() {
            println!(
                "{}",
                serde_json::json!({"fetch": {"kind": request.kind, "id": request.id}})
            );
        }
    }

    println!(
        "{}",
        serde_json::json!({
            "messages": session.registry().messages().count(),
            "containers": session.registry().containers().count(),
            "models": session.registry().models().count(),
        })
    );
    session.teardown();
    Ok(())
}

fn print_notifications(receiver: &mut NotificationReceiver) -> Result<()> {
    while let Ok(notification) = receiver.try_recv() {
        println!("{}", serde_json::to_string(&notification)?);
    }
    Ok(())
}

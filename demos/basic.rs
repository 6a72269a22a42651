//! Basic codoc example
//!
//! Walks the relay protocol in embedded mode: three in-process connections
//! sharing a document through the room registry and a memory store.
//!
//! Run with: cargo run --example basic

use std::sync::Arc;

use codoc_core::{Delta, RoomRegistry};
use codoc_protocol::{ClientMessage, ServerMessage};
use codoc_storage::MemoryStore;
use codoc_transport::ConnectionHandler;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("codoc basic example\n");

    let registry = Arc::new(RoomRegistry::new());
    let store = Arc::new(MemoryStore::new());

    // Alice connects and requests a document that does not exist yet.
    let mut alice = ConnectionHandler::new(registry.clone(), store.clone());
    let replies = alice
        .handle_message(ClientMessage::get_document("meeting-notes"))
        .await;
    println!("alice <- {:?}", replies);

    // Bob joins the same room.
    let mut bob = ConnectionHandler::new(registry.clone(), store.clone());
    bob.handle_message(ClientMessage::get_document("meeting-notes"))
        .await;

    // Alice types; the relay fans her change out to the room.
    let mut bob_events = registry.subscribe();
    alice
        .handle_message(ClientMessage::send_changes(Delta::insert(
            "# Team Meeting\n",
        )))
        .await;

    let event = bob_events.recv().await?;
    assert!(bob.wants(&event));
    assert!(!alice.wants(&event), "the sender never sees its own change");
    println!(
        "bob   <- {:?}",
        ServerMessage::changes_received(event.delta)
    );

    // Alice's periodic save pushes her full view of the document.
    alice
        .handle_message(ClientMessage::save_document(Delta::new(
            serde_json::json!("# Team Meeting\n"),
        )))
        .await;

    // A late joiner gets the persisted snapshot, not the edit history.
    let mut carol = ConnectionHandler::new(registry.clone(), store.clone());
    let replies = carol
        .handle_message(ClientMessage::get_document("meeting-notes"))
        .await;
    println!("carol <- {:?}", replies);

    alice.cleanup();
    bob.cleanup();
    carol.cleanup();

    println!("\nFor a networked session, start the relay and two clients:");
    println!("  cargo run --bin codocd");
    println!("  cargo run --bin codoc -- meeting-notes");

    Ok(())
}

use std::sync::Arc;

use bytes::Bytes;
use weavestore::ledger::MemoryLedger;
use weavestore::{ObjectStore, StoreConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("weavestore - content-addressed chunk store demo");
    println!("===============================================\n");

    let config = StoreConfig::default();
    println!("✓ Configuration:");
    println!("  - Chunk size: {} KB", config.chunk_size / 1024);
    println!("  - Cache dir:  {}", config.cache_dir.display());

    let ledger = Arc::new(MemoryLedger::new());
    let store = ObjectStore::open(config, ledger.clone()).await?;

    // Upload a payload spanning several chunks
    let payload: Vec<u8> = (0..1_000_000).map(|i| (i % 251) as u8).collect();
    let id = store.put(Bytes::from(payload.clone())).await?;
    println!("\n✓ Uploaded 1 MB payload");
    println!("  - File id: {id}");
    println!("  - Ledger transactions: {}", ledger.transaction_count());

    // Dedup: a second put of the same bytes submits nothing new
    let again = store.put(Bytes::from(payload.clone())).await?;
    assert_eq!(id, again);
    println!("\n✓ Re-upload deduplicated (same id, no new transactions)");

    // Round trip
    let back = store.get(&id).await?;
    assert_eq!(back, payload);
    println!("\n✓ Downloaded and verified byte-for-byte");

    store.close().await;
    Ok(())
}

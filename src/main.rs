use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use cairn::buffer::BufferPoolManager;
use cairn::common::StorageConfig;
use cairn::index::{create_index, IndexKind, IndexMetadata};
use cairn::storage::table::TableHeap;
use cairn::types::{KeySchema, TypeId, Value};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> cairn::Result<()> {
    println!("Cairn - a disk-oriented storage engine in Rust");
    println!("==============================================\n");

    let db_path = "demo.db";
    let config = StorageConfig::new(db_path).with_pool_size(16);
    let bpm = Arc::new(BufferPoolManager::open(&config)?);
    info!(db = db_path, pool_size = config.pool_size, "opened buffer pool");

    let heap = TableHeap::create(Arc::clone(&bpm), None)?;
    let metadata = IndexMetadata::new(
        "people_by_id",
        "people",
        vec![0],
        KeySchema::new(vec![TypeId::Integer]),
    );
    let index = create_index(IndexKind::ExtendibleHash, metadata, Arc::clone(&bpm))?;

    let people = ["Ada", "Grace", "Edsger", "Barbara"];
    for (id, name) in people.iter().enumerate() {
        let rid = heap.insert_tuple(name.as_bytes())?;
        index.insert_entry(&[Value::Integer(id as i32)], rid)?;
        println!("Inserted {} at {}", name, rid);
    }

    println!();
    for id in 0..people.len() as i32 {
        for rid in index.scan_key(&[Value::Integer(id)])? {
            let tuple = heap.get_tuple(rid)?;
            println!("Lookup {} -> {}", id, String::from_utf8_lossy(&tuple));
        }
    }

    bpm.flush_all_pages()?;
    println!(
        "\nFlushed to disk ({} page writes)",
        bpm.disk_manager().get_num_writes()
    );

    drop(index);
    drop(heap);
    drop(bpm);
    std::fs::remove_file(db_path).ok();
    if let Ok(log_path) = config.log_path() {
        std::fs::remove_file(log_path).ok();
    }
    println!("\nDemo completed successfully!");
    Ok(())
}

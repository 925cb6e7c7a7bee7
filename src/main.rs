use anyhow::{Context, Result};
use cloud_object::{
    CloudDataType, CloudObject, DiskStore, META_BUCKET_SUFFIX, StoreClient,
    config::{Command, StoreConfig},
};
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + command ---
    let (cfg, command) = StoreConfig::from_env_and_args();
    tracing::debug!("Using store config: {:?}", cfg);

    // --- Open store (applies the schema) ---
    let store = DiskStore::connect(&cfg)
        .await
        .with_context(|| format!("opening store at {}", cfg.database_url))?;
    let store: Arc<dyn StoreClient> = Arc::new(store);

    // The CLI never preprocesses, so an untyped data type is enough to
    // inspect objects and their companions.
    let data_type = Arc::new(CloudDataType::new("generic"));

    match command {
        Command::Migrate => {
            tracing::info!("Database migration complete.");
        }
        Command::CreateBucket { name } => {
            let meta = format!("{name}{META_BUCKET_SUFFIX}");
            // Both names must be valid before either bucket is created.
            DiskStore::validate_bucket_name(&name)?;
            DiskStore::validate_bucket_name(&meta)?;
            store.create_bucket(&name).await?;
            store.create_bucket(&meta).await?;
            tracing::info!("Created buckets {} and {}", name, meta);
        }
        Command::Upload { file, uri } => {
            let mut object = CloudObject::create_from_local(data_type, &file, &uri, store).await?;
            let size = object.size().await?;
            println!("{}", json!({ "uri": object.path().to_string(), "size": size }));
        }
        Command::Head { uri } => {
            let mut object = CloudObject::new(data_type, &uri, store)?;
            let (obj_meta, meta_meta) = object.fetch(false, false).await?;
            let out = json!({ "object": obj_meta, "companion": meta_meta });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::Status { uri } => {
            let mut object = CloudObject::new(data_type, &uri, store)?;
            let exists = object.exists().await?;
            let preprocessed = object.is_preprocessed().await?;
            let out = json!({
                "uri": object.path().to_string(),
                "exists": exists,
                "preprocessed": preprocessed,
            });
            println!("{out}");
        }
        Command::Attributes { uri, name } => {
            let object = CloudObject::from_existing(data_type, &uri, store, true).await?;
            let out = match name {
                Some(name) => object.get_attribute(&name)?.clone(),
                None => serde_json::to_value(object.attributes())?,
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }

    Ok(())
}

use mongodb::{Client, Collection, Database};

use crate::models::{LIST_COLLECTION, USER_COLLECTION};

/// Database used when the URI carries no default database.
const DEFAULT_DATABASE: &str = "user_bootstrap";

#[derive(Clone)]
pub struct MongoDB {
    client: Client,
    db: Database,
}

impl MongoDB {
    pub async fn new(uri: &str) -> Result<Self, mongodb::error::Error> {
        let mut client_options = mongodb::options::ClientOptions::parse(uri).await?;

        // Connection pool
        client_options.max_pool_size = Some(20);
        client_options.min_pool_size = Some(2);
        client_options.max_idle_time = Some(std::time::Duration::from_secs(300));

        // Timeouts
        client_options.connect_timeout = Some(std::time::Duration::from_secs(5));
        client_options.server_selection_timeout = Some(std::time::Duration::from_secs(5));

        let db_name = client_options
            .default_database
            .clone()
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        let client = Client::with_options(client_options)?;
        let db = client.database(&db_name);

        // Test connection
        db.list_collection_names().await?;
        log::info!("📊 Database: {}", db_name);

        Ok(Self { client, db })
    }

    /// Creates the collections the bootstrap batch writes to.
    /// Older servers cannot create collections inside a transaction.
    pub async fn ensure_collections(&self) -> Result<(), mongodb::error::Error> {
        log::info!("🔧 Ensuring collections...");

        let existing = self.db.list_collection_names().await?;
        let user_lists = format!("{}.{}", USER_COLLECTION, LIST_COLLECTION);

        for name in [USER_COLLECTION, user_lists.as_str()] {
            if existing.iter().any(|c| c == name) {
                log::debug!("   ℹ️  Collection already exists: {}", name);
                continue;
            }

            match self.db.create_collection(name).await {
                Ok(_) => log::info!("   ✅ Collection created: {}", name),
                // corrida com outra instância criando a mesma collection
                Err(e) => log::debug!("   ℹ️  Collection not created ({}): {}", name, e),
            }
        }

        log::info!("✅ Collections ready");
        Ok(())
    }

    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

use mongodb::bson::doc;
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Database, IndexModel};

pub struct MongoDB {
    pub client: Client,
    pub db: Database,
}

impl MongoDB {
    pub async fn init(uri: &str, db_name: &str) -> Self {
        let client_options = ClientOptions::parse(uri)
            .await
            .expect("Failed to parse MongoDB connection string");
        let client = Client::with_options(client_options).expect("Failed to initialize client");
        let db = client.database(db_name);
        MongoDB { client, db }
    }
}

/// Creates the unique indexes that back every key-uniqueness rule. Writers
/// retry with a fresh key on a duplicate-key error instead of checking first.
pub async fn ensure_indexes(db: &Database) -> mongodb::error::Result<()> {
    let unique = |keys: mongodb::bson::Document| {
        IndexModel::builder()
            .keys(keys)
            .options(IndexOptions::builder().unique(true).build())
            .build()
    };
    let unique_sparse = |keys: mongodb::bson::Document| {
        IndexModel::builder()
            .keys(keys)
            .options(IndexOptions::builder().unique(true).sparse(true).build())
            .build()
    };

    let users = db.collection::<mongodb::bson::Document>("users");
    users.create_index(unique(doc! { "email": 1 })).await?;
    users.create_index(unique(doc! { "externalId": 1 })).await?;

    let organizations = db.collection::<mongodb::bson::Document>("organizations");
    organizations.create_index(unique(doc! { "userId": 1 })).await?;
    organizations
        .create_index(unique_sparse(doc! { "projects.projectKey": 1 }))
        .await?;

    let doctors = db.collection::<mongodb::bson::Document>("doctors");
    doctors.create_index(unique(doc! { "userId": 1 })).await?;
    doctors
        .create_index(unique_sparse(doc! { "info.licenseNumber": 1 }))
        .await?;

    let ai_companies = db.collection::<mongodb::bson::Document>("ai_companies");
    ai_companies.create_index(unique(doc! { "userId": 1 })).await?;
    ai_companies
        .create_index(unique_sparse(doc! { "apiKey": 1 }))
        .await?;
    ai_companies
        .create_index(unique_sparse(doc! { "imageAddresses.accessKey": 1 }))
        .await?;

    let annotations = db.collection::<mongodb::bson::Document>("annotations");
    annotations.create_index(unique(doc! { "accessKey": 1 })).await?;

    let csv_datasets = db.collection::<mongodb::bson::Document>("csv_datasets");
    csv_datasets.create_index(unique(doc! { "key": 1 })).await?;

    Ok(())
}

/// True when the error is a Mongo E11000 unique-index violation.
pub fn is_duplicate_key_error(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};
    matches!(
        &*err.kind,
        ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == 11000
    )
}

//! Shared fixtures for the cascade integration tests

#![allow(dead_code)]

use std::sync::Arc;

use offer_cascade::{
    CascadeConfig, CascadeSession, CustomerRecord, FormField, Level, Role, StaticCatalogSource,
    UserContext,
};

pub const CATALOG: &str = include_str!("../fixtures/catalog.yaml");

pub fn source() -> Arc<StaticCatalogSource> {
    Arc::new(StaticCatalogSource::from_yaml(CATALOG).expect("fixture catalog parses"))
}

pub fn config() -> CascadeConfig {
    CascadeConfig::embedded().expect("embedded config is valid")
}

pub async fn open(
    source: &Arc<StaticCatalogSource>,
    user: &str,
    role: Role,
) -> CascadeSession<StaticCatalogSource> {
    CascadeSession::open(Arc::clone(source), &config().strategy(), UserContext::new(user, role))
        .await
        .expect("session opens")
}

/// Select each `(level, id)` in turn, failing the test on the first error
pub async fn walk(session: &mut CascadeSession<StaticCatalogSource>, path: &[(Level, &str)]) {
    for (level, id) in path {
        session
            .select(*level, &(*id).into())
            .await
            .unwrap_or_else(|err| panic!("select {level} {id}: {err}"));
    }
}

pub fn ids(session: &CascadeSession<StaticCatalogSource>, level: Level) -> Vec<String> {
    session
        .current_options(level)
        .iter()
        .map(|entity| entity.id.to_string())
        .collect()
}

pub fn personal_record() -> CustomerRecord {
    CustomerRecord::new()
        .with(FormField::FirstName, "Ada")
        .with(FormField::LastName, "Rossi")
        .with(FormField::FiscalCode, "RSSDAA80A01H501U")
        .with(FormField::BirthDate, "1980-01-01")
}

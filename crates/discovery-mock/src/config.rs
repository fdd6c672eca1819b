use std::collections::HashMap;

use serde::Deserialize;

/// Instance definition in the fixture file
#[derive(Debug, Deserialize)]
pub struct FixtureInstance {
    pub instance_id: String,
    pub port: Option<u16>,
    #[serde(default = "default_healthy")]
    pub healthy: bool,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// Service definition in the fixture file
#[derive(Debug, Deserialize)]
pub struct FixtureService {
    pub name: String,
    #[serde(default)]
    pub instances: Vec<FixtureInstance>,
    #[serde(default)]
    pub unavailable: bool,
}

/// Registry fixture file
#[derive(Debug, Deserialize)]
pub struct Fixture {
    pub namespace: String,
    pub services: Vec<FixtureService>,
}

const fn default_healthy() -> bool {
    true
}

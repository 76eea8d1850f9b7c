//! Cars API demo
//!
//! Every car belongs to the caller named in the `x-user-id` header; callers
//! only ever see, create and modify their own cars.
//!
//! ```text
//! cargo run --example cars
//!
//! curl -X POST localhost:5000/api/cars/create -H 'x-user-id: marc' \
//!      -d '{"brand":"Volvo","model":"V70","year":2016,"color":"Red","miles":81000}'
//! curl 'localhost:5000/api/cars/find?year__range=2015,2020&sort=-year' -H 'x-user-id: marc'
//! ```

use chrono::Datelike;
use crudgate::prelude::*;

impl_model!(Car, "car", {
    brand: String,
    model: String,
    year: i64,
    color: String,
    miles: f64,
    owner: String,
}, computed [miles_per_year, description]);

impl Car {
    /// Average miles driven per year since manufacture, counting the
    /// current year
    pub fn miles_per_year(&self) -> f64 {
        let current_year = i64::from(chrono::Utc::now().year());
        let years = (current_year - self.year + 1).max(1);
        self.miles / years as f64
    }

    pub fn description(&self) -> String {
        format!("A {} {} built by {}", self.color, self.model, self.brand)
    }
}

const CONFIG: &str = r#"
server:
  bind: "127.0.0.1:5000"
  base_path: "/api"
endpoints:
  - slug: cars
    model: car
    query: [brand, color, year, owner]
    return: [slug, owner, brand, color, year, model, miles_per_year, description]
"#;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crudgate=debug,tower_http=info".into()),
        )
        .init();

    let config = ApiConfig::from_yaml_str(CONFIG)?;
    let bind = config.server.bind.clone();

    ServerBuilder::new()
        .with_store(InMemoryStore::new())
        .register_model::<Car>()?
        .with_config(config)
        .with_hook("cars", OwnerScoped::new(HeaderIdentity::default(), "owner"))
        .serve(&bind)
        .await
}

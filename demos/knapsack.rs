//! Greedy knapsack instrumented against the benchmarking server.
//!
//! Runs offline against an in-memory server by default. With the `http` feature and
//! `ALGOBENCH_URL` set, it talks to a real one:
//!
//! ```text
//! ALGOBENCH_API_KEY=... ALGOBENCH_ENV_NAME=greedy-knapsack \
//!     cargo run --example knapsack --features http
//! ```

use algobench::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
struct Knapsack {
    weights: Vec<u32>,
    values: Vec<u32>,
    capacity: u32,
}

impl Serializable for Knapsack {
    const JSON_MODEL: bool = true;
}

fn greedy(knapsack: &Knapsack) -> Vec<usize> {
    let mut order: Vec<usize> = (0..knapsack.weights.len()).collect();
    order.sort_by(|&a, &b| {
        let ratio = |i: usize| f64::from(knapsack.values[i]) / f64::from(knapsack.weights[i]);
        ratio(b).total_cmp(&ratio(a))
    });

    let mut load = 0;
    let mut picked = Vec::new();
    for i in order {
        if load + knapsack.weights[i] <= knapsack.capacity {
            load += knapsack.weights[i];
            picked.push(i);
        }
    }
    picked.sort_unstable();
    picked
}

fn fits(knapsack: &Knapsack, picked: &Vec<usize>) -> bool {
    picked.iter().all(|&i| i < knapsack.weights.len())
        && picked.iter().map(|&i| knapsack.weights[i]).sum::<u32>() <= knapsack.capacity
}

fn total_value(knapsack: &Knapsack, picked: &Vec<usize>) -> u32 {
    picked.iter().map(|&i| knapsack.values[i]).sum()
}

#[cfg(feature = "http")]
fn service() -> anyhow::Result<impl RemoteService> {
    HttpService::from_env()
}

#[cfg(not(feature = "http"))]
fn service() -> anyhow::Result<impl RemoteService> {
    let key = std::env::var("ALGOBENCH_API_KEY").unwrap_or_default();
    Ok(InMemoryService::new().with_api_key(key))
}

fn main() -> anyhow::Result<()> {
    let mut credentials = Credentials::from_env();
    if credentials.env_name().is_empty() {
        credentials = Credentials::new(credentials.api_key(), "greedy-knapsack");
    }

    let algorithm = AlgorithmBuilder::new(greedy, fits, total_value)
        .with_credentials(credentials)
        .with_configuration(Configuration::from_env())
        .with_descriptor(
            StaticDescriptor::new(include_str!("knapsack.rs"))
                .with_dependency_manifest(include_str!("../Cargo.toml")),
        )
        .build(service()?);

    println!("instrumented: {}", algorithm.is_instrumented());
    for capacity in [7, 10, 15] {
        let knapsack = Knapsack {
            weights: vec![5, 4, 3, 6, 2],
            values: vec![10, 7, 5, 11, 3],
            capacity,
        };
        let picked = algorithm.call(&knapsack);
        println!(
            "capacity {capacity}: items {picked:?}, value {}",
            total_value(&knapsack, &picked)
        );
    }
    Ok(())
}

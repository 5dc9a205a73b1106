//! Small optimization problems shared by the integration tests.

use algobench::prelude::*;
use serde::{Deserialize, Serialize};

/// A single integer, used both as instance and as solution.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Number {
    pub value: i64,
}

impl Serializable for Number {
    const JSON_MODEL: bool = true;
}

pub fn double(instance: &Number) -> Number {
    Number {
        value: instance.value * 2,
    }
}

pub fn non_negative(_: &Number, solution: &Number) -> bool {
    solution.value >= 0
}

pub fn value(_: &Number, solution: &Number) -> i64 {
    solution.value
}

/// Item weights and values with a capacity. No JSON model, so it travels as a binary
/// snapshot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Knapsack {
    pub weights: Vec<u32>,
    pub values: Vec<u32>,
    pub capacity: u32,
}

impl Serializable for Knapsack {}

pub fn greedy(knapsack: &Knapsack) -> Vec<usize> {
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

pub fn fits(knapsack: &Knapsack, picked: &Vec<usize>) -> bool {
    picked.iter().all(|&i| i < knapsack.weights.len())
        && picked.iter().map(|&i| knapsack.weights[i]).sum::<u32>() <= knapsack.capacity
}

pub fn total_value(knapsack: &Knapsack, picked: &Vec<usize>) -> f64 {
    picked
        .iter()
        .map(|&i| f64::from(knapsack.values[i]))
        .sum()
}

pub fn knapsack() -> Knapsack {
    Knapsack {
        weights: vec![5, 4, 3],
        values: vec![10, 7, 5],
        capacity: 7,
    }
}

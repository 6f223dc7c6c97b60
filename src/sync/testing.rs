//! Scripted `ChainReader` for unit tests

use super::chain::ChainReader;
use super::error::SyncError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
struct ScriptState {
    counter: u64,
    counter_fails: bool,
    owner_fail_once: HashSet<u64>,
    points: HashMap<String, f64>,
    points_fail_once: HashSet<String>,
    points_fail_always: HashSet<String>,
    owner_calls: HashMap<u64, u32>,
    points_calls: HashMap<String, u32>,
}

/// Chain with `counter` tokens spread over three owners
pub struct ScriptedChain {
    state: Mutex<ScriptState>,
}

impl ScriptedChain {
    pub fn with_tokens(counter: u64) -> Self {
        Self {
            state: Mutex::new(ScriptState {
                counter,
                ..Default::default()
            }),
        }
    }

    /// Canonical (lowercase) owner of `token_id`
    pub fn owner_for(token_id: u64) -> String {
        format!("0x{:040x}", 0xa0 + token_id % 3)
    }

    pub fn set_counter(&self, counter: u64) {
        self.state.lock().unwrap().counter = counter;
    }

    pub fn fail_counter(&self, fails: bool) {
        self.state.lock().unwrap().counter_fails = fails;
    }

    pub fn fail_owner_once(&self, token_id: u64) {
        self.state.lock().unwrap().owner_fail_once.insert(token_id);
    }

    pub fn set_points(&self, address: &str, points: f64) {
        self.state.lock().unwrap().points.insert(address.to_lowercase(), points);
    }

    pub fn fail_points_once(&self, address: &str) {
        self.state
            .lock()
            .unwrap()
            .points_fail_once
            .insert(address.to_lowercase());
    }

    /// Every balance read for `address` reverts
    pub fn fail_points_always(&self, address: &str) {
        self.state
            .lock()
            .unwrap()
            .points_fail_always
            .insert(address.to_lowercase());
    }

    pub fn owner_calls(&self, token_id: u64) -> u32 {
        *self.state.lock().unwrap().owner_calls.get(&token_id).unwrap_or(&0)
    }

    pub fn points_calls(&self, address: &str) -> u32 {
        *self
            .state
            .lock()
            .unwrap()
            .points_calls
            .get(&address.to_lowercase())
            .unwrap_or(&0)
    }
}

#[async_trait]
impl ChainReader for ScriptedChain {
    async fn token_counter(&self) -> Result<u64, SyncError> {
        let state = self.state.lock().unwrap();
        if state.counter_fails {
            return Err(SyncError::remote("counter unavailable"));
        }
        Ok(state.counter)
    }

    async fn owner_of(&self, token_id: u64) -> Result<String, SyncError> {
        let mut state = self.state.lock().unwrap();
        *state.owner_calls.entry(token_id).or_insert(0) += 1;

        if state.owner_fail_once.remove(&token_id) {
            return Err(SyncError::remote(format!("owner {} unavailable", token_id)));
        }
        if token_id == 0 || token_id > state.counter {
            return Err(SyncError::invalid(format!("token {} does not exist", token_id)));
        }

        // Checksummed-looking casing; jobs must normalise it
        Ok(Self::owner_for(token_id).to_uppercase().replacen("0X", "0x", 1))
    }

    async fn points_balance(&self, address: &str) -> Result<f64, SyncError> {
        let mut state = self.state.lock().unwrap();
        let key = address.to_lowercase();
        *state.points_calls.entry(key.clone()).or_insert(0) += 1;

        if state.points_fail_once.remove(&key) {
            return Err(SyncError::remote(format!("points for {} unavailable", key)));
        }
        if state.points_fail_always.contains(&key) {
            return Err(SyncError::invalid(format!("getPoints({}) reverted", key)));
        }

        Ok(*state.points.get(&key).unwrap_or(&0.0))
    }
}

//! Memoized least-fixpoint evaluation over entity keys.
//!
//! A value may depend on other keys, including itself. While a computation is
//! running, a key seen for the second time in the same round yields its
//! current approximation (starting at the bottom value); rounds repeat until
//! nothing changes. Keys visited in the final round are settled and answered
//! from the cache afterwards.

use cranelift_entity::{EntityRef, EntitySet, SecondaryMap};

pub struct Fixpoint<K: EntityRef, V: Clone + PartialEq> {
    bottom: V,
    values: SecondaryMap<K, Option<V>>,
    settled: EntitySet<K>,
    visited: EntitySet<K>,
    round: Vec<K>,
    running: bool,
    changed: bool,
}

impl<K: EntityRef, V: Clone + PartialEq> Fixpoint<K, V> {
    pub fn new(bottom: V) -> Self {
        Fixpoint {
            bottom,
            values: SecondaryMap::new(),
            settled: EntitySet::new(),
            visited: EntitySet::new(),
            round: Vec::new(),
            running: false,
            changed: false,
        }
    }

    /// Settled value of `key`, if it has been calculated.
    pub fn get(&self, key: K) -> Option<&V> {
        match self.settled.contains(key) {
            true => self.values[key].as_ref().or(Some(&self.bottom)),
            false => None,
        }
    }

    pub fn calculate<F>(&mut self, key: K, compute: &mut F) -> V
    where
        F: FnMut(&mut Self, K) -> V,
    {
        if self.settled.contains(key) {
            return self.current(key);
        }
        if self.running {
            return self.step(key, compute);
        }

        self.running = true;
        let mut rounds = 0;
        let value = loop {
            rounds += 1;
            self.changed = false;
            self.visited.clear();
            self.round.clear();
            let value = self.step(key, compute);
            if !self.changed {
                break value;
            }
        };
        self.running = false;

        for &k in &self.round {
            self.settled.insert(k);
        }
        log::trace!("fixpoint settled {} keys in {rounds} rounds", self.round.len());

        value
    }

    fn step<F>(&mut self, key: K, compute: &mut F) -> V
    where
        F: FnMut(&mut Self, K) -> V,
    {
        if !self.visited.insert(key) {
            return self.current(key);
        }
        self.round.push(key);

        let value = compute(self, key);
        if value != self.current(key) {
            self.changed = true;
            self.values[key] = Some(value.clone());
        }
        value
    }

    fn current(&self, key: K) -> V {
        match &self.values[key] {
            Some(value) => value.clone(),
            None => self.bottom.clone(),
        }
    }
}

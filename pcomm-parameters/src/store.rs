//!
//! Parameter storage.
//!
//! `ParameterStore` is the authoritative map of one node's parameters.
//! Every batch mutation runs under a single write lock, so readers observe
//! either the map before a batch or after it, never part of one.
//!

use std::{
    collections::{BTreeSet, HashMap},
    time::{SystemTime, UNIX_EPOCH},
};

use parking_lot::RwLock;

use crate::messages::ParameterEvent;
use crate::types::{Parameter, ParameterValue, SetParametersResult};

/// The per-parameter results and the resulting diff of one mutation
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    /// One result per input entry, in input order
    pub results: Vec<SetParametersResult>,
    /// Everything the mutation added, changed, or removed
    pub event: ParameterEvent,
}

/// The parameter map owned by a single node.
#[derive(Debug)]
pub struct ParameterStore {
    node_id: String,
    parameters: RwLock<HashMap<String, ParameterValue>>,
}

impl ParameterStore {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            parameters: RwLock::new(HashMap::new()),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Apply a batch of parameters.
    ///
    /// `validate` is called with each entry's position and the entry; a
    /// rejected entry gets a failed result and leaves the map untouched
    /// while the rest of the batch is still applied.  An existing name is
    /// reported as changed even when the new value equals the old one.
    pub fn set_parameters<V>(&self, batch: Vec<Parameter>, validate: V) -> MutationOutcome
    where
        V: FnMut(usize, &Parameter) -> Result<(), String>,
    {
        self.set_parameters_and_notify(batch, validate, |_| ())
    }

    /// Apply a batch of parameters and call `notify` with the diff while
    /// the write lock is still held.
    ///
    /// `notify` is only called when the diff is not empty.  Notifications
    /// for one store are therefore issued in commit order.
    pub fn set_parameters_and_notify<V, N>(
        &self,
        batch: Vec<Parameter>,
        mut validate: V,
        notify: N,
    ) -> MutationOutcome
    where
        V: FnMut(usize, &Parameter) -> Result<(), String>,
        N: FnOnce(&ParameterEvent),
    {
        // Validation runs outside the write lock.
        let checked: Vec<(Parameter, Result<(), String>)> = batch
            .into_iter()
            .enumerate()
            .map(|(index, parameter)| {
                let verdict = validate(index, &parameter);
                (parameter, verdict)
            })
            .collect();

        let mut results = Vec::with_capacity(checked.len());
        let mut event = ParameterEvent::new(self.node_id.clone());

        let mut parameters = self.parameters.write();
        for (parameter, verdict) in checked {
            if let Err(reason) = verdict {
                results.push(SetParametersResult::failure(reason));
                continue;
            }

            match parameters.insert(parameter.name.clone(), parameter.value.clone()) {
                None => event.new_parameters.push(parameter),
                Some(_) => event.changed_parameters.push(parameter),
            }
            results.push(SetParametersResult::success());
        }

        event.timestamp_ns = timestamp_ns();
        if !event.is_empty() {
            notify(&event);
        }
        drop(parameters);

        MutationOutcome { results, event }
    }

    /// Remove the named parameters
    pub fn delete_parameters(&self, names: Vec<String>) -> MutationOutcome {
        self.delete_parameters_and_notify(names, |_| ())
    }

    /// Remove the named parameters and call `notify` with the diff while
    /// the write lock is still held.
    ///
    /// Names that are not present get a failed result.
    pub fn delete_parameters_and_notify<N>(&self, names: Vec<String>, notify: N) -> MutationOutcome
    where
        N: FnOnce(&ParameterEvent),
    {
        let mut results = Vec::with_capacity(names.len());
        let mut event = ParameterEvent::new(self.node_id.clone());

        let mut parameters = self.parameters.write();
        for name in names {
            match parameters.remove(&name) {
                Some(value) => {
                    event.deleted_parameters.push(Parameter { name, value });
                    results.push(SetParametersResult::success());
                }
                None => {
                    results.push(SetParametersResult::failure(format!(
                        "parameter '{}' not found",
                        name
                    )));
                }
            }
        }

        event.timestamp_ns = timestamp_ns();
        if !event.is_empty() {
            notify(&event);
        }
        drop(parameters);

        MutationOutcome { results, event }
    }

    /// Get the value of a parameter.
    pub fn get(&self, name: &str) -> Option<ParameterValue> {
        self.parameters.read().get(name).cloned()
    }

    /// The named parameters that exist, in request order.  Missing names
    /// are skipped.
    pub fn get_parameters(&self, names: &[String]) -> Vec<Parameter> {
        let parameters = self.parameters.read();
        names
            .iter()
            .filter_map(|name| {
                parameters.get(name).map(|value| Parameter {
                    name: name.clone(),
                    value: value.clone(),
                })
            })
            .collect()
    }

    /// Every parameter currently held, sorted by name
    pub fn snapshot(&self) -> Vec<Parameter> {
        let parameters = self.parameters.read();
        let mut snapshot: Vec<Parameter> = parameters
            .iter()
            .map(|(name, value)| Parameter {
                name: name.clone(),
                value: value.clone(),
            })
            .collect();
        snapshot.sort_by(|a, b| a.name.cmp(&b.name));
        snapshot
    }

    /// Every parameter name, sorted
    pub fn list_names(&self) -> Vec<String> {
        self.list_parameters(&[], 0)
    }

    /// Parameter names starting with any of `prefixes` (every name when
    /// `prefixes` is empty).  A non-zero `depth` excludes names containing
    /// `depth` or more `.` separators.  The result is sorted and free of
    /// duplicates.
    pub fn list_parameters(&self, prefixes: &[String], depth: u32) -> Vec<String> {
        let parameters = self.parameters.read();
        parameters
            .keys()
            .filter(|name| prefixes.is_empty() || prefixes.iter().any(|p| name.starts_with(p.as_str())))
            .filter(|name| depth == 0 || name.matches('.').count() < depth as usize)
            .cloned()
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parameters.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.parameters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.read().is_empty()
    }
}

/// Nanoseconds since the Unix epoch, or zero if the clock is before it
fn timestamp_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
    };

    fn accept_all(_: usize, _: &Parameter) -> Result<(), String> {
        Ok(())
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_set_and_get() {
        let store = ParameterStore::new("robot1");
        let parameter = Parameter::new("max_speed", 2.5);
        store.set_parameters(vec![parameter.clone()], accept_all);

        assert_eq!(store.get_parameters(&names(&["max_speed"])), vec![parameter]);
        assert_eq!(store.get("max_speed"), Some(ParameterValue::Double(2.5)));
        assert_eq!(store.node_id(), "robot1");
    }

    #[test]
    fn test_diff_classification() {
        let store = ParameterStore::new("robot1");
        let first = store.set_parameters(vec![Parameter::new("mode", "idle")], accept_all);
        assert_eq!(first.event.new_parameters, vec![Parameter::new("mode", "idle")]);
        assert!(first.event.changed_parameters.is_empty());
        assert!(first.event.deleted_parameters.is_empty());
        assert_eq!(first.event.node_id, "robot1");
        assert!(first.event.timestamp_ns > 0);

        let second = store.set_parameters(
            vec![Parameter::new("mode", "drive"), Parameter::new("gear", 1i64)],
            accept_all,
        );
        assert_eq!(second.event.new_parameters, vec![Parameter::new("gear", 1i64)]);
        assert_eq!(
            second.event.changed_parameters,
            vec![Parameter::new("mode", "drive")]
        );
        assert!(second.event.deleted_parameters.is_empty());
    }

    #[test]
    fn test_identical_value_counts_as_changed() {
        let store = ParameterStore::new("robot1");
        store.set_parameters(vec![Parameter::new("gain", 1.0)], accept_all);
        let outcome = store.set_parameters(vec![Parameter::new("gain", 1.0)], accept_all);

        assert_eq!(outcome.results, vec![SetParametersResult::success()]);
        assert_eq!(outcome.event.changed_parameters, vec![Parameter::new("gain", 1.0)]);
    }

    #[test]
    fn test_partial_failure_isolation() {
        let store = ParameterStore::new("robot1");
        let outcome = store.set_parameters(
            vec![Parameter::new("valid", true), Parameter::new("invalid", false)],
            |_, parameter| {
                if parameter.name == "invalid" {
                    Err(String::from("rejected"))
                } else {
                    Ok(())
                }
            },
        );

        assert_eq!(
            outcome.results,
            vec![
                SetParametersResult::success(),
                SetParametersResult::failure("rejected")
            ]
        );
        assert!(store.contains("valid"));
        assert!(!store.contains("invalid"));
        assert_eq!(outcome.event.new_parameters, vec![Parameter::new("valid", true)]);
    }

    #[test]
    fn test_notify_only_on_change() {
        let store = ParameterStore::new("robot1");
        let mut notified = 0;
        store.set_parameters_and_notify(Vec::new(), accept_all, |_| notified += 1);
        assert_eq!(notified, 0);

        store.set_parameters_and_notify(
            vec![Parameter::new("a", 1i64)],
            accept_all,
            |event| {
                assert_eq!(event.new_parameters.len(), 1);
                notified += 1;
            },
        );
        assert_eq!(notified, 1);
    }

    #[test]
    fn test_get_preserves_order_and_skips_missing() {
        let store = ParameterStore::new("robot1");
        store.set_parameters(
            vec![Parameter::new("a", 1i64), Parameter::new("b", 2i64)],
            accept_all,
        );

        let found = store.get_parameters(&names(&["b", "missing", "a"]));
        assert_eq!(found, vec![Parameter::new("b", 2i64), Parameter::new("a", 1i64)]);
    }

    #[test]
    fn test_list_names() {
        let store = ParameterStore::new("robot1");
        for name in ["c", "a", "b"] {
            store.set_parameters(vec![Parameter::new(name, true)], accept_all);
        }
        store.set_parameters(vec![Parameter::new("a", false)], accept_all);

        assert_eq!(store.list_names(), names(&["a", "b", "c"]));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_list_prefixes_and_depth() {
        let store = ParameterStore::new("robot1");
        for name in ["camera.fps", "camera.exposure.auto", "lidar.range", "mode"] {
            store.set_parameters(vec![Parameter::new(name, true)], accept_all);
        }

        assert_eq!(
            store.list_parameters(&names(&["camera"]), 0),
            names(&["camera.exposure.auto", "camera.fps"])
        );
        assert_eq!(
            store.list_parameters(&names(&["camera"]), 2),
            names(&["camera.fps"])
        );
        assert_eq!(store.list_parameters(&[], 1), names(&["mode"]));
        assert_eq!(
            store.list_parameters(&names(&["camera", "camera.f"]), 0),
            names(&["camera.exposure.auto", "camera.fps"])
        );
    }

    #[test]
    fn test_delete_parameters() {
        let store = ParameterStore::new("robot1");
        store.set_parameters(vec![Parameter::new("a", 1i64)], accept_all);

        let outcome = store.delete_parameters(names(&["a", "missing"]));
        assert_eq!(outcome.results[0], SetParametersResult::success());
        assert!(!outcome.results[1].successful);
        assert_eq!(outcome.results[1].reason, "parameter 'missing' not found");
        assert_eq!(outcome.event.deleted_parameters, vec![Parameter::new("a", 1i64)]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_disjoint_batches() {
        let store = Arc::new(ParameterStore::new("robot1"));

        let handles: Vec<_> = (0..8)
            .map(|thread_index| {
                let store = store.clone();
                thread::spawn(move || {
                    for batch in 0..25 {
                        let parameters = (0..4)
                            .map(|i| Parameter::new(format!("t{thread_index}.b{batch}.p{i}"), i as i64))
                            .collect();
                        let outcome = store.set_parameters(parameters, accept_all);
                        assert!(outcome.results.iter().all(|result| result.successful));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 8 * 25 * 4);
    }

    #[test]
    fn test_batches_are_atomic_to_readers() {
        let store = Arc::new(ParameterStore::new("robot1"));
        store.set_parameters(
            vec![Parameter::new("x", 0i64), Parameter::new("y", 0i64)],
            accept_all,
        );
        let done = Arc::new(AtomicBool::new(false));

        let reader = {
            let store = store.clone();
            let done = done.clone();
            thread::spawn(move || {
                let pair = names(&["x", "y"]);
                while !done.load(Ordering::SeqCst) {
                    let values = store.get_parameters(&pair);
                    assert_eq!(values[0].value, values[1].value);
                }
            })
        };

        for i in 1..2_000i64 {
            store.set_parameters(
                vec![Parameter::new("x", i), Parameter::new("y", i)],
                accept_all,
            );
        }
        done.store(true, Ordering::SeqCst);
        reader.join().unwrap();
    }

    #[test]
    fn test_validation_does_not_hold_the_lock() {
        let store = ParameterStore::new("robot1");
        store.set_parameters(vec![Parameter::new("x", 0i64)], accept_all);

        let outcome = store.set_parameters(
            vec![Parameter::new("x", 1i64), Parameter::new("y", 2i64)],
            |_, _| match store.parameters.try_read() {
                Some(parameters) if parameters.len() == 1 => Ok(()),
                Some(_) => Err(String::from("batch applied before validation finished")),
                None => Err(String::from("store locked during validation")),
            },
        );

        assert!(outcome.results.iter().all(|result| result.successful));
        assert_eq!(store.get("x"), Some(ParameterValue::Integer(1)));
        assert_eq!(store.len(), 2);
    }
}

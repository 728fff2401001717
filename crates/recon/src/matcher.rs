use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::model::{LookupFailure, MatchCandidate, MatchRecord};
use crate::normalize::scrub_field;
use crate::registry::{LookupOptions, TaxonRegistry};

#[derive(Debug, Clone, Copy)]
pub struct MatchSettings {
    pub options: LookupOptions,
    pub workers: usize,
    pub batch_timeout: Option<Duration>,
}

impl From<&RegistryConfig> for MatchSettings {
    fn from(config: &RegistryConfig) -> Self {
        Self {
            options: LookupOptions::from(config),
            workers: config.workers,
            batch_timeout: config.batch_timeout(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MatchOutcome {
    /// One record per input name, in input order.
    pub records: Vec<MatchRecord>,
    pub failures: Vec<LookupFailure>,
}

enum Slot {
    Done(Result<Vec<MatchCandidate>, RegistryError>),
    TimedOut,
}

/// Look up every name, degrading failed or timed-out lookups to unmatched
/// records instead of failing the batch.
///
/// Workers pull indices from a shared cursor and results are placed back
/// by index, so output order always equals input order.
pub fn match_names(
    registry: &dyn TaxonRegistry,
    names: &[String],
    settings: &MatchSettings,
) -> MatchOutcome {
    let deadline = settings.batch_timeout.map(|t| Instant::now() + t);
    let workers = settings.workers.clamp(1, names.len().max(1));
    let options = LookupOptions { deadline, ..settings.options };

    let cursor = AtomicUsize::new(0);
    let cursor = &cursor;
    let mut slots: Vec<Option<Slot>> = names.iter().map(|_| None).collect();

    thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(move || {
                    let mut done = Vec::new();
                    loop {
                        let idx = cursor.fetch_add(1, Ordering::Relaxed);
                        let Some(name) = names.get(idx) else { break };
                        if deadline.is_some_and(|d| Instant::now() >= d) {
                            done.push((idx, Slot::TimedOut));
                            continue;
                        }
                        done.push((idx, Slot::Done(registry.lookup(name, options))));
                    }
                    done
                })
            })
            .collect();

        for handle in handles {
            match handle.join() {
                Ok(done) => {
                    for (idx, slot) in done {
                        slots[idx] = Some(slot);
                    }
                }
                Err(_) => log::error!("lookup worker panicked; its names are reported unmatched"),
            }
        }
    });

    let mut outcome = MatchOutcome::default();
    for (name, slot) in names.iter().zip(slots) {
        let failure = match slot {
            Some(Slot::Done(Ok(candidates))) => {
                let candidates = candidates.into_iter().map(scrub_candidate).collect();
                outcome.records.push(MatchRecord::from_candidates(name.as_str(), candidates));
                continue;
            }
            Some(Slot::Done(Err(e))) => LookupFailure {
                query_name: name.clone(),
                timed_out: matches!(e, RegistryError::DeadlineExceeded { .. }),
                reason: e.to_string(),
            },
            Some(Slot::TimedOut) => LookupFailure {
                query_name: name.clone(),
                reason: "batch timeout expired before lookup".into(),
                timed_out: true,
            },
            None => LookupFailure {
                query_name: name.clone(),
                reason: "lookup did not complete".into(),
                timed_out: false,
            },
        };
        log::warn!("lookup for \"{}\" degraded to unmatched: {}", name, failure.reason);
        outcome.records.push(MatchRecord::unmatched(name.as_str()));
        outcome.failures.push(failure);
    }

    let timed_out = outcome.failures.iter().filter(|f| f.timed_out).count();
    if timed_out > 0 {
        log::warn!("batch timeout: {timed_out} of {} names not looked up", names.len());
    }
    outcome
}

fn scrub_candidate(c: MatchCandidate) -> MatchCandidate {
    MatchCandidate {
        name: scrub_field(&c.name),
        taxon_id: c.taxon_id,
        author: c.author.map(|a| scrub_field(&a)).filter(|a| !a.is_empty()),
        valid_name: c.valid_name.map(|v| scrub_field(&v)).filter(|v| !v.is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TaxonId, TaxonRecord};
    use crate::registry::FetchOptions;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct ScriptedRegistry {
        answers: HashMap<String, Result<Vec<MatchCandidate>, RegistryError>>,
        delay: Duration,
        seen: Mutex<Vec<String>>,
        deadlines: Mutex<Vec<Option<Instant>>>,
    }

    impl ScriptedRegistry {
        fn new(answers: Vec<(&str, Result<Vec<MatchCandidate>, RegistryError>)>) -> Self {
            Self {
                answers: answers.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
                deadlines: Mutex::new(Vec::new()),
            }
        }
    }

    impl TaxonRegistry for ScriptedRegistry {
        fn lookup(
            &self,
            name: &str,
            options: LookupOptions,
        ) -> Result<Vec<MatchCandidate>, RegistryError> {
            thread::sleep(self.delay);
            self.seen.lock().unwrap().push(name.to_string());
            self.deadlines.lock().unwrap().push(options.deadline);
            self.answers.get(name).cloned().unwrap_or(Ok(Vec::new()))
        }

        fn fetch_records(
            &self,
            _ids: &[TaxonId],
            _options: FetchOptions,
        ) -> Result<Vec<TaxonRecord>, RegistryError> {
            Ok(Vec::new())
        }
    }

    fn cand(name: &str, id: u64) -> MatchCandidate {
        MatchCandidate {
            name: name.into(),
            taxon_id: TaxonId::from(id),
            author: None,
            valid_name: Some(name.into()),
        }
    }

    fn settings(workers: usize) -> MatchSettings {
        MatchSettings {
            options: LookupOptions { return_all_candidates: true, deadline: None },
            workers,
            batch_timeout: None,
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn one_record_per_name_in_order() {
        let reg = ScriptedRegistry::new(vec![
            ("Nitzschia", Ok(vec![cand("Nitzschia", 1)])),
            ("Amphora", Ok(vec![cand("Amphora", 2)])),
        ]);
        let input = names(&["Nitzschia", "UnknownSpeciesXYZ", "Amphora"]);
        let out = match_names(&reg, &input, &settings(1));
        assert_eq!(out.records.len(), 3);
        assert_eq!(out.records[0].taxon_id(), Some(&TaxonId::from(1u64)));
        assert!(!out.records[1].is_matched());
        assert_eq!(out.records[2].query_name(), "Amphora");
        assert!(out.failures.is_empty());
    }

    #[test]
    fn parallel_preserves_input_order() {
        let answers: Vec<(String, MatchCandidate)> = (0..40u64)
            .map(|i| (format!("Taxon {i}"), cand(&format!("Taxon {i}"), i)))
            .collect();
        let mut reg = ScriptedRegistry::new(
            answers
                .iter()
                .map(|(n, c)| (n.as_str(), Ok(vec![c.clone()])))
                .collect(),
        );
        reg.delay = Duration::from_millis(1);
        let input: Vec<String> = answers.iter().map(|(n, _)| n.clone()).collect();

        let out = match_names(&reg, &input, &settings(8));
        assert_eq!(out.records.len(), 40);
        for (i, rec) in out.records.iter().enumerate() {
            assert_eq!(rec.query_name(), input[i]);
            assert_eq!(rec.taxon_id(), Some(&TaxonId::from(i as u64)));
        }
        assert_eq!(reg.seen.lock().unwrap().len(), 40);
    }

    #[test]
    fn failed_lookup_degrades_to_unmatched() {
        let reg = ScriptedRegistry::new(vec![
            ("Nitzschia", Err(RegistryError::Upstream("HTTP 503 after 3 attempts".into()))),
            ("Amphora", Ok(vec![cand("Amphora", 2)])),
        ]);
        let out = match_names(&reg, &names(&["Nitzschia", "Amphora"]), &settings(2));
        assert_eq!(out.records.len(), 2);
        assert!(!out.records[0].is_matched());
        assert!(out.records[1].is_matched());
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].query_name, "Nitzschia");
        assert!(out.failures[0].reason.contains("503"));
        assert!(!out.failures[0].timed_out);
    }

    #[test]
    fn expired_deadline_reports_remaining_as_timed_out() {
        let mut reg = ScriptedRegistry::new(vec![("A", Ok(vec![cand("A", 1)]))]);
        reg.delay = Duration::from_millis(30);
        let mut s = settings(1);
        s.batch_timeout = Some(Duration::from_millis(10));

        let out = match_names(&reg, &names(&["A", "B", "C"]), &s);
        assert_eq!(out.records.len(), 3);
        // First lookup starts before the deadline and completes.
        assert!(out.records[0].is_matched());
        assert!(!out.records[1].is_matched());
        assert!(!out.records[2].is_matched());
        assert_eq!(out.failures.len(), 2);
        assert!(out.failures.iter().all(|f| f.timed_out));
    }

    #[test]
    fn deadline_reaches_registry() {
        let reg = ScriptedRegistry::new(vec![]);
        let mut s = settings(1);
        s.batch_timeout = Some(Duration::from_secs(30));
        let before = Instant::now();

        match_names(&reg, &names(&["A"]), &s);
        let seen = reg.deadlines.lock().unwrap();
        let deadline = seen[0].expect("deadline passed to lookup");
        assert!(deadline > before && deadline <= Instant::now() + Duration::from_secs(30));

        let reg = ScriptedRegistry::new(vec![]);
        match_names(&reg, &names(&["A"]), &settings(1));
        assert_eq!(reg.deadlines.lock().unwrap()[0], None);
    }

    #[test]
    fn lookup_cut_off_by_deadline_is_timed_out() {
        let reg = ScriptedRegistry::new(vec![
            ("Nitzschia", Err(RegistryError::DeadlineExceeded { attempts: 1 })),
            ("Amphora", Ok(vec![cand("Amphora", 2)])),
        ]);
        let mut s = settings(1);
        s.batch_timeout = Some(Duration::from_secs(30));

        let out = match_names(&reg, &names(&["Nitzschia", "Amphora"]), &s);
        assert!(!out.records[0].is_matched());
        assert!(out.records[1].is_matched());
        assert_eq!(out.failures.len(), 1);
        assert!(out.failures[0].timed_out);
        assert!(out.failures[0].reason.contains("batch timeout"));
    }

    #[test]
    fn candidate_text_is_scrubbed() {
        let mut c = cand("Nitzschia\u{00A0}sp.", 7);
        c.valid_name = Some("Nitzschia\u{00A0}".into());
        c.author = Some("  ".into());
        let reg = ScriptedRegistry::new(vec![("Nitzschia sp.", Ok(vec![c]))]);
        let out = match_names(&reg, &names(&["Nitzschia sp."]), &settings(1));
        let rec = &out.records[0];
        assert_eq!(rec.best_match(), Some("Nitzschia sp."));
        assert_eq!(rec.valid_name(), Some("Nitzschia"));
        assert!(rec.author().is_none());
    }

    #[test]
    fn empty_input() {
        let reg = ScriptedRegistry::new(vec![]);
        let out = match_names(&reg, &[], &settings(4));
        assert!(out.records.is_empty());
        assert!(out.failures.is_empty());
    }
}

//! Per-kind, per-priority lanes. A kind's batch drain always exhausts the
//! high lane before touching medium, and medium before low (§4.F).

use std::collections::{HashMap, VecDeque};

use crate::types::{Job, JobKind, Priority};

#[derive(Default)]
pub struct Lanes {
    high: VecDeque<Job>,
    medium: VecDeque<Job>,
    low: VecDeque<Job>,
}

impl Lanes {
    fn lane_mut(&mut self, priority: Priority) -> &mut VecDeque<Job> {
        match priority {
            Priority::High => &mut self.high,
            Priority::Medium => &mut self.medium,
            Priority::Low => &mut self.low,
        }
    }

    fn push(&mut self, job: Job) {
        self.lane_mut(job.priority).push_back(job);
    }

    fn pop_front(&mut self) -> Option<Job> {
        self.high
            .pop_front()
            .or_else(|| self.medium.pop_front())
            .or_else(|| self.low.pop_front())
    }

    pub fn len(&self) -> usize {
        self.high.len() + self.medium.len() + self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn len_for(&self, priority: Priority) -> usize {
        match priority {
            Priority::High => self.high.len(),
            Priority::Medium => self.medium.len(),
            Priority::Low => self.low.len(),
        }
    }
}

/// All lanes, keyed by job kind.
#[derive(Default)]
pub struct QueueTable {
    lanes: HashMap<JobKind, Lanes>,
}

impl QueueTable {
    pub fn push(&mut self, job: Job) {
        self.lanes.entry(job.kind).or_default().push(job);
    }

    /// Drains up to `batch_size` jobs for `kind`, high priority first.
    pub fn drain_batch(&mut self, kind: JobKind, batch_size: usize) -> Vec<Job> {
        let Some(lanes) = self.lanes.get_mut(&kind) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(batch_size.min(lanes.len()));
        while out.len() < batch_size {
            match lanes.pop_front() {
                Some(job) => out.push(job),
                None => break,
            }
        }
        out
    }

    pub fn len(&self, kind: JobKind) -> usize {
        self.lanes.get(&kind).map(Lanes::len).unwrap_or(0)
    }

    /// Per-priority depth for `kind`, used for the `job_queue_depth` gauge
    /// (§4.F, §10.3) — reported per lane since a single aggregate number
    /// would hide a high-priority backlog behind a drained low-priority one.
    pub fn depths_by_priority(&self, kind: JobKind) -> [(Priority, usize); 3] {
        let lanes = self.lanes.get(&kind);
        Priority::ALL_HIGH_TO_LOW.map(|priority| (priority, lanes.map(|l| l.len_for(priority)).unwrap_or(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn job(id: u64, priority: Priority) -> Job {
        Job::new(id, JobKind::ErrorGrouping, priority, json!({}), Utc::now())
    }

    #[test]
    fn drains_high_before_medium_before_low() {
        let mut table = QueueTable::default();
        table.push(job(1, Priority::Low));
        table.push(job(2, Priority::High));
        table.push(job(3, Priority::Medium));
        table.push(job(4, Priority::High));

        let batch = table.drain_batch(JobKind::ErrorGrouping, 10);
        let ids: Vec<u64> = batch.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![2, 4, 3, 1]);
    }

    #[test]
    fn drain_batch_respects_batch_size() {
        let mut table = QueueTable::default();
        for i in 0..5 {
            table.push(job(i, Priority::High));
        }
        let batch = table.drain_batch(JobKind::ErrorGrouping, 3);
        assert_eq!(batch.len(), 3);
        assert_eq!(table.len(JobKind::ErrorGrouping), 2);
    }

    #[test]
    fn drain_batch_on_empty_kind_is_empty() {
        let mut table = QueueTable::default();
        assert!(table.drain_batch(JobKind::StatsRecalculation, 10).is_empty());
    }
}

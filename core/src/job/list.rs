use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

use super::state::{JobStatus, TranslationJob};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("job {0} is translating and cannot be removed")]
    JobBusy(String),
    #[error("job {0} not found")]
    NotFound(String),
}

/// Ordered set of queued jobs. Insertion order is run order.
#[derive(Debug, Default, Clone)]
pub struct JobList {
    jobs: Vec<TranslationJob>,
}

impl JobList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Enqueue new files. A path already in the list is not added twice.
    /// Returns the jobs that were created.
    pub fn add_paths<I, P>(&mut self, paths: I) -> Vec<TranslationJob>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut known: HashSet<PathBuf> = self
            .jobs
            .iter()
            .map(|job| job.path().to_path_buf())
            .collect();
        let mut added = Vec::new();
        for path in paths {
            let job = TranslationJob::new(path);
            if !known.insert(job.path().to_path_buf()) {
                continue;
            }
            added.push(job.clone());
            self.jobs.push(job);
        }
        added
    }

    pub fn remove(&mut self, id: &str) -> Result<TranslationJob, JobError> {
        let index = self
            .jobs
            .iter()
            .position(|job| job.id() == id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        if self.jobs[index].status == JobStatus::Translating {
            return Err(JobError::JobBusy(id.to_string()));
        }
        Ok(self.jobs.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<&TranslationJob> {
        self.jobs.iter().find(|job| job.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut TranslationJob> {
        self.jobs.iter_mut().find(|job| job.id() == id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.jobs.iter().map(|job| job.id().to_string()).collect()
    }

    pub fn snapshot(&self) -> Vec<TranslationJob> {
        self.jobs.clone()
    }

    pub fn translating(&self) -> Option<&TranslationJob> {
        self.jobs
            .iter()
            .find(|job| job.status == JobStatus::Translating)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order_and_skips_duplicates() {
        let mut list = JobList::new();
        let added = list.add_paths(["/tmp/a.pdf", "/tmp/b.pdf", "/tmp/a.pdf"]);
        assert_eq!(added.len(), 2);
        assert_eq!(list.len(), 2);

        let names: Vec<_> = list
            .snapshot()
            .iter()
            .map(|job| job.display_name().to_string())
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);

        assert!(list.add_paths(["/tmp/b.pdf"]).is_empty());
    }

    #[test]
    fn translating_job_cannot_be_removed() {
        let mut list = JobList::new();
        let id = list.add_paths(["/tmp/a.pdf"])[0].id().to_string();
        list.get_mut(&id).unwrap().begin_attempt();

        assert_eq!(list.remove(&id).unwrap_err(), JobError::JobBusy(id.clone()));
        assert_eq!(list.len(), 1);

        list.get_mut(&id).unwrap().finish(Some(1));
        assert!(list.remove(&id).is_ok());
        assert!(list.is_empty());
    }

    #[test]
    fn unknown_id_is_not_found() {
        let mut list = JobList::new();
        assert_eq!(
            list.remove("missing").unwrap_err(),
            JobError::NotFound("missing".into())
        );
    }

    #[test]
    fn finds_translating_job() {
        let mut list = JobList::new();
        let ids: Vec<String> = list
            .add_paths(["/tmp/a.pdf", "/tmp/b.pdf"])
            .iter()
            .map(|job| job.id().to_string())
            .collect();
        assert!(list.translating().is_none());
        list.get_mut(&ids[1]).unwrap().begin_attempt();
        assert_eq!(list.translating().map(|job| job.id()), Some(ids[1].as_str()));
    }
}

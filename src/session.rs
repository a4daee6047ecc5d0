use crate::config::Options;
use indexmap::IndexMap;
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Unseen,
    SeenOnce,
    SeenAgain,
}

#[derive(Debug, Clone)]
pub struct Session {
    options: Options,
    files: IndexMap<String, usize>,
    tags: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub files: Vec<String>,
    pub invocations: usize,
    pub tags: usize,
}

impl Session {
    pub fn open(options: Options) -> Self {
        debug!(
            "opening session (mode {}, prefix '{}')",
            options.mode, options.prefix
        );
        Self {
            options,
            files: IndexMap::new(),
            tags: IndexMap::new(),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn file_state(&self, file: &str) -> FileState {
        match self.files.get(file).copied().unwrap_or(0) {
            0 => FileState::Unseen,
            1 => FileState::SeenOnce,
            _ => FileState::SeenAgain,
        }
    }

    pub fn has_seen(&self, file: &str) -> bool {
        self.files.contains_key(file)
    }

    pub fn seen_files(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Global baseline styles belong to the session's first file only.
    pub fn includes_global_baseline(&self, file: &str) -> bool {
        self.files.is_empty() || self.files.get_index_of(file) == Some(0)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains_key(tag)
    }

    pub fn tag_origin(&self, tag: &str) -> Option<&str> {
        self.tags.get(tag).map(String::as_str)
    }

    pub fn tags_introduced_by<'a>(&'a self, file: &'a str) -> impl Iterator<Item = &'a str> {
        self.tags
            .iter()
            .filter(move |(_, origin)| origin.as_str() == file)
            .map(|(tag, _)| tag.as_str())
    }

    /// Records a completed invocation. Tags already known keep their
    /// original file.
    pub(crate) fn commit(&mut self, file: &str, new_tags: &[String]) {
        for tag in new_tags {
            self.tags
                .entry(tag.clone())
                .or_insert_with(|| file.to_string());
        }
        *self.files.entry(file.to_string()).or_insert(0) += 1;
    }

    pub fn close(self) -> SessionSummary {
        let summary = SessionSummary {
            invocations: self.files.values().sum(),
            files: self.files.into_keys().collect(),
            tags: self.tags.len(),
        };
        debug!(
            "closing session after {} invocations over {} files",
            summary.invocations,
            summary.files.len()
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::{FileState, Session};
    use crate::config::Options;
    use pretty_assertions::assert_eq;

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn tracks_file_states() {
        let mut session = Session::open(Options::default());
        assert_eq!(session.file_state("A.svelte"), FileState::Unseen);
        session.commit("A.svelte", &[]);
        assert_eq!(session.file_state("A.svelte"), FileState::SeenOnce);
        session.commit("A.svelte", &[]);
        assert_eq!(session.file_state("A.svelte"), FileState::SeenAgain);
        assert_eq!(session.seen_files().collect::<Vec<_>>(), vec!["A.svelte"]);
    }

    #[test]
    fn first_seen_tag_keeps_its_origin() {
        let mut session = Session::open(Options::default());
        session.commit("A.svelte", &tags(&["div", "h1"]));
        session.commit("B.svelte", &tags(&["div", "p"]));
        session.commit("A.svelte", &tags(&["div", "h1"]));

        assert_eq!(session.tag_origin("div"), Some("A.svelte"));
        assert_eq!(session.tag_origin("p"), Some("B.svelte"));
        assert_eq!(
            session.tags_introduced_by("A.svelte").collect::<Vec<_>>(),
            vec!["div", "h1"]
        );
        assert_eq!(session.close().tags, 3);
    }

    #[test]
    fn global_baseline_belongs_to_first_file() {
        let mut session = Session::open(Options::default());
        assert!(session.includes_global_baseline("A.svelte"));
        session.commit("A.svelte", &[]);
        assert!(session.includes_global_baseline("A.svelte"));
        assert!(!session.includes_global_baseline("B.svelte"));
        session.commit("B.svelte", &[]);
        assert!(!session.includes_global_baseline("B.svelte"));
    }

    #[test]
    fn close_reports_files_in_order() {
        let mut session = Session::open(Options::default());
        session.commit("B.svelte", &[]);
        session.commit("A.svelte", &[]);
        session.commit("B.svelte", &[]);
        let summary = session.close();
        assert_eq!(summary.files, vec!["B.svelte".to_string(), "A.svelte".to_string()]);
        assert_eq!(summary.invocations, 3);
    }
}

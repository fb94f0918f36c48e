//! Remote path selection by keyword and extension.

use crate::config::FilterConfig;

/// Decides whether a discovered remote path should be processed
///
/// A path qualifies when it contains the keyword (case-insensitive) anywhere in
/// the full path and its final extension equals the configured one
/// (case-insensitive, leading dot optional in the configuration).
#[derive(Clone, Debug)]
pub struct PathFilter {
    keyword: String,
    extension: String,
}

impl PathFilter {
    /// Create a filter; an empty keyword matches every path
    pub fn new(keyword: &str, extension: &str) -> Self {
        Self {
            keyword: keyword.to_lowercase(),
            extension: extension.trim().trim_start_matches('.').to_lowercase(),
        }
    }

    /// Create a filter from configuration
    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(&config.keyword, &config.extension)
    }

    /// Whether `path` qualifies for processing
    pub fn matches(&self, path: &str) -> bool {
        let lowered = path.to_lowercase();
        if !lowered.contains(&self.keyword) {
            return false;
        }

        let file_name = lowered.rsplit('/').next().unwrap_or(&lowered);
        match file_name.rsplit_once('.') {
            // a lone leading dot (".csv") marks a hidden file, not an extension
            Some((stem, ext)) => !stem.is_empty() && ext == self.extension,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_and_extension_must_both_match() {
        let filter = PathFilter::new("target", ".csv");
        assert!(filter.matches("/data/incoming/target_report.csv"));
        assert!(!filter.matches("/data/incoming/other.csv"));
        assert!(!filter.matches("/data/incoming/target_report.txt"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let filter = PathFilter::new("Target", "CSV");
        assert!(filter.matches("/DATA/TARGET_REPORT.CSV"));
        assert!(filter.matches("/data/target_report.Csv"));
    }

    #[test]
    fn keyword_may_appear_in_a_directory_name() {
        let filter = PathFilter::new("target", ".csv");
        assert!(filter.matches("/data/target/daily.csv"));
    }

    #[test]
    fn only_the_final_extension_counts() {
        let filter = PathFilter::new("rpt", ".csv");
        assert!(!filter.matches("/data/rpt.csv.gz"));
        assert!(filter.matches("/data/rpt.tar.csv"));
        assert!(!filter.matches("/data/rpt_csv"));
        assert!(!filter.matches("/data.csv/rpt"));
    }

    #[test]
    fn dotfile_has_no_extension() {
        let filter = PathFilter::new("", "csv");
        assert!(!filter.matches("/data/.csv"));
        assert!(filter.matches("/data/a.csv"));
    }

    #[test]
    fn empty_keyword_matches_any_path_with_extension() {
        let filter = PathFilter::new("", ".csv");
        assert!(filter.matches("/x/y/z.csv"));
        assert!(!filter.matches("/x/y/z.json"));
    }
}

// Substring filters deciding which relayed messages reach the log

use crate::config::LogFilter;

#[derive(Debug, Clone, Default)]
pub struct LogFilters {
    match_in: Vec<String>,
    match_out: Vec<String>,
}

impl LogFilters {
    pub fn new(filters: &[LogFilter]) -> Self {
        let (out, keep): (Vec<&LogFilter>, Vec<&LogFilter>) =
            filters.iter().partition(|filter| filter.filter_out);

        Self {
            match_in: keep.into_iter().map(|f| f.match_on.clone()).collect(),
            match_out: out.into_iter().map(|f| f.match_on.clone()).collect(),
        }
    }

    /// An allow match always logs; otherwise a deny match suppresses
    pub fn should_log(&self, msg: &[u8]) -> bool {
        let text = String::from_utf8_lossy(msg);

        if self.match_in.iter().any(|needle| text.contains(needle.as_str())) {
            return true;
        }
        !self.match_out.iter().any(|needle| text.contains(needle.as_str()))
    }
}

//! Terminal spinner driven by loading-indicator keys

use std::collections::HashMap;
use std::io::IsTerminal;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use factrack::permission::LoadingIndicator;

/// [`LoadingIndicator`] that shows one stderr spinner per active key.
///
/// Hidden when stderr is not a terminal or when output is JSON, so piped
/// output stays clean.
pub struct SpinnerIndicator {
    message: String,
    visible: bool,
    /// Spinner and number of outstanding starts per key
    bars: Mutex<HashMap<String, (ProgressBar, usize)>>,
}

impl SpinnerIndicator {
    pub fn new(message: impl Into<String>, json_output: bool) -> Self {
        Self {
            message: message.into(),
            visible: !json_output && std::io::stderr().is_terminal(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn bar(&self) -> ProgressBar {
        if !self.visible {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            bar.set_style(style);
        }
        bar.set_message(self.message.clone());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    }
}

impl LoadingIndicator for SpinnerIndicator {
    fn start(&self, key: &str) {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        match bars.get_mut(key) {
            Some((_, count)) => *count += 1,
            None => {
                bars.insert(key.to_string(), (self.bar(), 1));
            }
        }
    }

    fn stop(&self, key: &str) {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        let Some((_, count)) = bars.get_mut(key) else {
            return;
        };
        *count -= 1;
        if *count == 0
            && let Some((bar, _)) = bars.remove(key)
        {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spinner_stays_until_last_stop() {
        let spinner = SpinnerIndicator::new("Checking permissions...", true);

        spinner.start("guard:a");
        spinner.start("guard:a");
        assert_eq!(spinner.bars.lock().unwrap().len(), 1);

        spinner.stop("guard:a");
        assert!(spinner.bars.lock().unwrap().contains_key("guard:a"));

        spinner.stop("guard:a");
        spinner.stop("guard:missing");
        assert!(spinner.bars.lock().unwrap().is_empty());
    }
}

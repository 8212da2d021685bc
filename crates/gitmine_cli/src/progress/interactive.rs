use std::sync::Mutex;
use std::time::Duration;

use gitmine::HarvestProgress;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Consolidated progress state under a single lock.
#[derive(Default)]
struct ProgressState {
    /// Bar for the harvest in flight. Starts as a spinner and turns into a
    /// bar once the Link header reveals the last page.
    harvest_bar: Option<ProgressBar>,
    /// Bar for last-commit resolution.
    resolve_bar: Option<ProgressBar>,
    /// Bar for repository cloning.
    clone_bar: Option<ProgressBar>,
}

/// Interactive progress reporter using indicatif.
pub struct InteractiveReporter {
    multi: MultiProgress,
    state: Mutex<ProgressState>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            state: Mutex::new(ProgressState::default()),
        }
    }

    /// Reporter that draws nothing.
    #[cfg(test)]
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden()),
            state: Mutex::new(ProgressState::default()),
        }
    }

    pub fn handle(&self, event: HarvestProgress) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            HarvestProgress::HarvestStarted { url } => {
                if let Some(previous) = state.harvest_bar.take()
                    && !previous.is_finished()
                {
                    previous.finish_and_clear();
                }
                let pb = self.multi.add(ProgressBar::new_spinner());
                pb.set_style(Self::counter_style());
                pb.set_prefix(format!("{:12}", "harvest"));
                pb.enable_steady_tick(Duration::from_millis(100));
                pb.set_message(url);
                state.harvest_bar = Some(pb);
            }

            HarvestProgress::PageFetched {
                page,
                last_page,
                remaining,
            } => {
                if let Some(ref pb) = state.harvest_bar {
                    if let Some(last) = last_page
                        && pb.length() != Some(u64::from(last))
                    {
                        // Convert the spinner to a bar in-place.
                        pb.disable_steady_tick();
                        pb.set_length(u64::from(last));
                        pb.set_style(Self::bar_style());
                    }
                    pb.set_position(u64::from(page));
                    pb.set_message(format!("{remaining} requests left"));
                }
            }

            HarvestProgress::RateLimitWait { wait, .. } => {
                if let Some(ref pb) = state.harvest_bar {
                    pb.set_message(format!("Rate limited, waiting {}s", wait.as_secs()));
                }
            }

            HarvestProgress::HarvestComplete { pages, truncated } => {
                if let Some(pb) = state.harvest_bar.take() {
                    let suffix = if truncated { " (page cap reached)" } else { "" };
                    pb.finish_with_message(format!("{pages} pages{suffix}"));
                }
            }

            HarvestProgress::ResolvingCommits { total } => {
                let pb = self.multi.add(ProgressBar::new(total as u64));
                pb.set_style(Self::bar_style());
                pb.set_prefix(format!("{:12}", "last-commit"));
                state.resolve_bar = Some(pb);
            }

            HarvestProgress::ResolvedCommit {
                index,
                total,
                name,
                resolved,
            } => {
                if let Some(ref pb) = state.resolve_bar {
                    pb.set_position(index as u64);
                    let name = name.unwrap_or_default();
                    if resolved {
                        pb.set_message(name);
                    } else {
                        pb.println(format!("  no commit for {name}"));
                    }
                    if index >= total {
                        pb.finish_with_message("done");
                    }
                }
            }

            HarvestProgress::CloningRepos { total } => {
                let pb = self.multi.add(ProgressBar::new(total as u64));
                pb.set_style(Self::bar_style());
                pb.set_prefix(format!("{:12}", "clone"));
                state.clone_bar = Some(pb);
            }

            HarvestProgress::ClonedRepo { name, error } => {
                if let Some(ref pb) = state.clone_bar {
                    pb.inc(1);
                    match error {
                        Some(error) => pb.println(format!("  {name}: {error}")),
                        None => pb.set_message(name),
                    }
                    if pb.length().is_some_and(|len| pb.position() >= len) {
                        pb.finish_with_message("done");
                    }
                }
            }

            _ => {}
        }
    }

    pub fn finish(&self) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for pb in [&state.harvest_bar, &state.resolve_bar, &state.clone_bar]
            .into_iter()
            .flatten()
        {
            if !pb.is_finished() {
                pb.finish();
            }
        }
    }

    fn counter_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {pos:>4} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>3}/{len:3} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}

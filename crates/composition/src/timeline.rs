//! Seekable timeline contract.

/// An animatable composition that can be positioned deterministically.
///
/// Seeking to the same progress must always yield the same visual state,
/// and must not depend on wall-clock time.
pub trait SeekableTimeline {
    /// Total duration in seconds.
    fn duration_secs(&self) -> f64;

    /// Position the composition at `progress` in `[0.0, 1.0]`.
    fn seek(&mut self, progress: f64);
}

impl<T: SeekableTimeline + ?Sized> SeekableTimeline for &mut T {
    fn duration_secs(&self) -> f64 {
        (**self).duration_secs()
    }

    fn seek(&mut self, progress: f64) {
        (**self).seek(progress)
    }
}

impl<T: SeekableTimeline + ?Sized> SeekableTimeline for Box<T> {
    fn duration_secs(&self) -> f64 {
        (**self).duration_secs()
    }

    fn seek(&mut self, progress: f64) {
        (**self).seek(progress)
    }
}

/// Clamp a progress value into `[0.0, 1.0]`, mapping NaN to `0.0`.
pub fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    }
}

/// Progress fraction reached after `elapsed_secs` of a timeline lasting
/// `duration_secs`. Zero-length timelines are always complete.
pub fn progress_at(elapsed_secs: f64, duration_secs: f64) -> f64 {
    if duration_secs <= 0.0 {
        return 1.0;
    }
    clamp_progress(elapsed_secs / duration_secs)
}

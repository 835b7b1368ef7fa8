//! 进度上报与 CLI 进度条管理。
//!
//! 每个阶段（抓图 / 生成 PDF）各持有一个 `PhaseProgress`，
//! 两者再按 80/20 加权汇总到 `CombinedProgress`，驱动进度条或 UI 回调。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const ACQUISITION_WEIGHT: f64 = 0.8;
const ASSEMBLY_WEIGHT: f64 = 0.2;
const BAR_SCALE: u64 = 1000;

type UnitListener = Box<dyn Fn(usize) + Send + Sync>;

/// 单阶段进度计数器。
///
/// 内部以“子步骤”累计，对外按 `floor(accumulated / steps_per_unit)` 报告，
/// 这样两种抓图策略都落在 `0..=total` 的同一刻度上。
pub struct PhaseProgress {
    total: usize,
    steps_per_unit: usize,
    accumulated: AtomicUsize,
    listener: Option<UnitListener>,
}

impl PhaseProgress {
    pub fn new(total: usize, steps_per_unit: usize) -> Self {
        Self {
            total,
            steps_per_unit: steps_per_unit.max(1),
            accumulated: AtomicUsize::new(0),
            listener: None,
        }
    }

    pub fn with_listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn advance(&self, steps: usize) {
        let acc = self.accumulated.fetch_add(steps, Ordering::SeqCst) + steps;
        let units = self.units_for(acc);
        if let Some(cb) = self.listener.as_ref() {
            cb(units);
        }
    }

    pub fn units(&self) -> usize {
        self.units_for(self.accumulated.load(Ordering::SeqCst))
    }

    fn units_for(&self, accumulated: usize) -> usize {
        (accumulated / self.steps_per_unit).min(self.total)
    }
}

#[derive(Default)]
struct CombinedState {
    acquisition: f64,
    assembly: f64,
    reported: f64,
}

/// 两阶段加权汇总：`0.8 * 抓图 + 0.2 * 生成`，对外单调不减。
pub struct CombinedProgress {
    state: Mutex<CombinedState>,
    cb: Mutex<Option<Box<dyn FnMut(f64) + Send>>>,
    bar: Option<ProgressBar>,
}

impl CombinedProgress {
    pub fn new(cb: Option<Box<dyn FnMut(f64) + Send>>, cli_bar: bool) -> Arc<Self> {
        let bar = cli_bar.then(|| {
            let style = ProgressStyle::with_template(
                "{prefix} [{elapsed_precise}] {wide_bar} {percent}% ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
            let bar = ProgressBar::with_draw_target(Some(BAR_SCALE), ProgressDrawTarget::stderr());
            bar.set_style(style);
            bar.set_prefix("生成PDF");
            bar
        });
        Arc::new(Self {
            state: Mutex::new(CombinedState::default()),
            cb: Mutex::new(cb),
            bar,
        })
    }

    pub fn silent() -> Arc<Self> {
        Self::new(None, false)
    }

    /// 抓图阶段计数器，按每页两个子步骤折半。
    pub fn acquisition_phase(self: &Arc<Self>, pages: usize) -> PhaseProgress {
        let me = Arc::clone(self);
        PhaseProgress::new(pages, 2).with_listener(move |units| {
            me.update(|s| s.acquisition = ratio(units, pages));
        })
    }

    /// PDF 生成阶段计数器：嵌入完成一次、排版完成一次。
    pub fn assembly_phase(self: &Arc<Self>, images: usize) -> PhaseProgress {
        let me = Arc::clone(self);
        PhaseProgress::new(images, 2).with_listener(move |units| {
            me.update(|s| s.assembly = ratio(units, images));
        })
    }

    pub fn fraction(&self) -> f64 {
        self.state.lock().map(|s| s.reported).unwrap_or(0.0)
    }

    pub fn reset(&self) {
        if let Ok(mut s) = self.state.lock() {
            *s = CombinedState::default();
        }
        if let Some(bar) = self.bar.as_ref() {
            bar.set_position(0);
        }
        self.emit(0.0);
    }

    pub fn finish(&self) {
        if let Some(bar) = self.bar.as_ref() {
            bar.finish_and_clear();
        }
    }

    fn update(&self, apply: impl FnOnce(&mut CombinedState)) {
        let value = {
            let Ok(mut s) = self.state.lock() else {
                return;
            };
            apply(&mut s);
            let combined =
                ACQUISITION_WEIGHT * s.acquisition + ASSEMBLY_WEIGHT * s.assembly;
            s.reported = s.reported.max(combined.min(1.0));
            s.reported
        };
        if let Some(bar) = self.bar.as_ref() {
            bar.set_position((value * BAR_SCALE as f64).round() as u64);
        }
        self.emit(value);
    }

    fn emit(&self, value: f64) {
        if let Ok(mut guard) = self.cb.lock()
            && let Some(cb) = guard.as_mut()
        {
            cb(value);
        }
    }
}

fn ratio(units: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        units as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halves_substeps_with_floor() {
        let p = PhaseProgress::new(3, 2);
        p.advance(1);
        assert_eq!(p.units(), 0);
        p.advance(1);
        assert_eq!(p.units(), 1);
        p.advance(3);
        assert_eq!(p.units(), 2);
        p.advance(1);
        assert_eq!(p.units(), 3);
    }

    #[test]
    fn units_never_exceed_total() {
        let p = PhaseProgress::new(2, 2);
        p.advance(10);
        assert_eq!(p.units(), 2);
    }

    #[test]
    fn listener_sees_every_advance() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let p = PhaseProgress::new(2, 2).with_listener(move |u| sink.lock().unwrap().push(u));
        p.advance(2);
        p.advance(1);
        p.advance(1);
        assert_eq!(*seen.lock().unwrap(), vec![1, 1, 2]);
    }

    #[test]
    fn combined_weights_phases_80_20() {
        let values = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&values);
        let combined = CombinedProgress::new(
            Some(Box::new(move |v| sink.lock().unwrap().push(v))),
            false,
        );

        let acq = combined.acquisition_phase(4);
        acq.advance(8);
        assert!((combined.fraction() - 0.8).abs() < 1e-9);

        let asm = combined.assembly_phase(4);
        asm.advance(4);
        assert!((combined.fraction() - 0.9).abs() < 1e-9);
        asm.advance(4);
        assert!((combined.fraction() - 1.0).abs() < 1e-9);

        let values = values.lock().unwrap();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
    }
}

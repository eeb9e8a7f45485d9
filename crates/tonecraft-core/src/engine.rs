//! Curve engine: configuration, LUT cache, accelerator dispatch and the
//! process-wide lifecycle.
//!
//! An [`Engine`] can be owned directly. Hosts that expect global
//! `initialize`/`cleanup` entry points use the functions at the bottom of
//! this module, which manage one shared engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::apply::{apply_luts, ApplyContext, LutBinding};
use crate::buffer::{PixelView, PixelViewMut};
use crate::color::ColorTransform;
use crate::curve::validate_lut_size;
use crate::diagnostics::{emit, Severity};
use crate::parallel::CancelToken;
use crate::stats::{analyze_with_cancel, AnalysisConfig, ImageStatistics};
use crate::suggest::{film_curve, optimize_curve, synthesize, AiSuggestionParams, Suggestion};
use crate::{ChannelScope, Curve, CurveError, CurveResult, Lut, DEFAULT_LUT_SIZE};

/// Smallest LUT built in real-time mode.
const REALTIME_MIN_LUT_SIZE: usize = 256;
/// Largest LUT built in real-time mode.
const REALTIME_MAX_LUT_SIZE: usize = 1024;

/// Alternate execution path for LUT application, such as a GPU backend.
///
/// Implementations take the same inputs and must give the same output as
/// [`apply_luts`]. Returning [`CurveError::AcceleratorUnavailable`] hands the
/// call back to the software path.
pub trait Accelerator: Send + Sync {
    fn name(&self) -> &str;

    /// Number of operators the backend exposes.
    fn operator_count(&self) -> usize;

    fn supports_ai(&self) -> bool {
        false
    }

    fn apply(
        &self,
        bindings: &[LutBinding<'_>],
        input: &PixelView<'_>,
        output: &mut PixelViewMut<'_>,
    ) -> CurveResult<()>;
}

/// Engine construction options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Record per-operation timings.
    pub profiling: bool,
    /// Worker threads for a dedicated pool. 0 uses rayon's global pool.
    pub thread_count: usize,
    /// Maximum cached LUTs. 0 disables the cache.
    pub lut_cache_capacity: usize,
    /// LUT size given to curves the engine creates.
    pub default_lut_size: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            profiling: false,
            thread_count: 0,
            lut_cache_capacity: 32,
            default_lut_size: DEFAULT_LUT_SIZE,
        }
    }
}

impl EngineOptions {
    pub fn validate(&self) -> CurveResult<()> {
        validate_lut_size(self.default_lut_size)
    }
}

/// Per-call processing options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingOptions {
    /// Try the accelerator before the software path.
    pub use_acceleration: bool,
    /// Fail instead of falling back when the accelerator cannot serve the call.
    pub require_acceleration: bool,
    /// Trade LUT resolution for speed.
    pub real_time: bool,
    /// Real-time quality in [0, 1]. Ignored unless `real_time` is set.
    pub quality: f32,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            use_acceleration: true,
            require_acceleration: false,
            real_time: false,
            quality: 1.0,
        }
    }
}

impl ProcessingOptions {
    pub fn validate(&self) -> CurveResult<()> {
        if !(self.quality.is_finite() && (0.0..=1.0).contains(&self.quality)) {
            return Err(CurveError::InvalidParams(format!(
                "quality must be in [0, 1], got {}",
                self.quality
            )));
        }
        if self.require_acceleration && !self.use_acceleration {
            return Err(CurveError::InvalidParams(
                "require_acceleration needs use_acceleration".to_string(),
            ));
        }
        Ok(())
    }

    /// LUT size to build for `curve` under these options.
    ///
    /// Real-time mode scales from 256 entries at quality 0 to 1024 at
    /// quality 1, never exceeding the curve's own size.
    pub fn lut_size_for(&self, curve: &Curve) -> usize {
        if !self.real_time {
            return curve.lut_size();
        }
        let span = (REALTIME_MAX_LUT_SIZE - REALTIME_MIN_LUT_SIZE) as f32;
        let size = REALTIME_MIN_LUT_SIZE + (span * self.quality.clamp(0.0, 1.0)).round() as usize;
        size.clamp(REALTIME_MIN_LUT_SIZE, REALTIME_MAX_LUT_SIZE)
            .min(curve.lut_size())
    }
}

/// Settings for one feature, as received from the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "feature")]
pub enum FeatureSettings {
    ToneCurve(ProcessingOptions),
    Analysis(AnalysisConfig),
    Suggestion(AiSuggestionParams),
}

impl FeatureSettings {
    pub fn validate(&self) -> CurveResult<()> {
        match self {
            FeatureSettings::ToneCurve(opts) => opts.validate(),
            FeatureSettings::Analysis(config) => config.validate(),
            FeatureSettings::Suggestion(params) => params.validate(),
        }
    }
}

/// Advisory telemetry. Never affects results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    /// Duration of the last operation. Only recorded while profiling.
    pub processing_time_ms: f64,
    /// Fraction of apply calls served by the accelerator.
    pub accelerator_utilization: f64,
    /// Bytes held by cached LUTs.
    pub memory_used_bytes: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

#[derive(Debug, Default)]
struct Telemetry {
    last_ms: f64,
    apply_calls: u64,
    accelerated_calls: u64,
    cache_hits: u64,
    cache_misses: u64,
}

/// Built LUTs keyed by the exact bits of the curve they came from.
struct LutCache {
    capacity: usize,
    entries: HashMap<Vec<u32>, Arc<Lut>>,
}

impl LutCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
        }
    }

    fn get(&self, key: &[u32]) -> Option<Arc<Lut>> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: Vec<u32>, lut: Arc<Lut>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() >= self.capacity {
            tracing::debug!(entries = self.entries.len(), "lut cache full, clearing");
            self.entries.clear();
        }
        self.entries.insert(key, lut);
    }

    fn memory_bytes(&self) -> usize {
        self.entries.values().map(|lut| lut.memory_bytes()).sum()
    }
}

/// Tone curve engine.
pub struct Engine {
    options: EngineOptions,
    accelerator: Option<Arc<dyn Accelerator>>,
    transform: Option<Arc<dyn ColorTransform>>,
    pool: Option<rayon::ThreadPool>,
    cache: Mutex<LutCache>,
    telemetry: Mutex<Telemetry>,
    profiling: AtomicBool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("options", &self.options)
            .field("accelerator", &self.accelerator.as_ref().map(|a| a.name()))
            .field("dedicated_pool", &self.pool.is_some())
            .finish()
    }
}

impl Engine {
    /// Create a software-only engine.
    pub fn new(options: EngineOptions) -> CurveResult<Self> {
        options.validate()?;
        let pool = match options.thread_count {
            0 => None,
            n => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("tonecraft-{}", i))
                    .build()
                    .map_err(|e| {
                        CurveError::InvalidParams(format!("cannot start thread pool: {}", e))
                    })?,
            ),
        };

        tracing::debug!(
            threads = options.thread_count,
            cache = options.lut_cache_capacity,
            "engine created"
        );

        Ok(Self {
            cache: Mutex::new(LutCache::new(options.lut_cache_capacity)),
            profiling: AtomicBool::new(options.profiling),
            options,
            accelerator: None,
            transform: None,
            pool,
            telemetry: Mutex::new(Telemetry::default()),
        })
    }

    /// Create an engine that dispatches LUT application to `accelerator`.
    pub fn with_accelerator(
        options: EngineOptions,
        accelerator: Arc<dyn Accelerator>,
    ) -> CurveResult<Self> {
        let mut engine = Self::new(options)?;
        emit(
            Severity::Info,
            &format!(
                "accelerator {} attached with {} operators",
                accelerator.name(),
                accelerator.operator_count()
            ),
        );
        engine.accelerator = Some(accelerator);
        Ok(engine)
    }

    /// Use `transform` for Luminance and Lab scopes.
    pub fn with_transform(mut self, transform: Arc<dyn ColorTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn is_acceleration_available(&self) -> bool {
        self.accelerator.is_some()
    }

    pub fn is_ai_available(&self) -> bool {
        self.accelerator.as_ref().is_some_and(|a| a.supports_ai())
    }

    pub fn operator_count(&self) -> usize {
        self.accelerator.as_ref().map_or(0, |a| a.operator_count())
    }

    pub fn set_profiling(&self, enabled: bool) {
        self.profiling.store(enabled, Ordering::Relaxed);
    }

    pub fn is_profiling(&self) -> bool {
        self.profiling.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> PerformanceStats {
        let t = self.telemetry.lock();
        let accelerator_utilization = if t.apply_calls == 0 {
            0.0
        } else {
            t.accelerated_calls as f64 / t.apply_calls as f64
        };
        PerformanceStats {
            processing_time_ms: t.last_ms,
            accelerator_utilization,
            memory_used_bytes: self.cache.lock().memory_bytes(),
            cache_hits: t.cache_hits,
            cache_misses: t.cache_misses,
        }
    }

    pub fn reset_stats(&self) {
        *self.telemetry.lock() = Telemetry::default();
    }

    /// Drop every cached LUT.
    pub fn clear_cache(&self) {
        self.cache.lock().entries.clear();
    }

    /// Build the LUT for `curve`, or return the cached one.
    pub fn generate_lut(&self, curve: &Curve, opts: &ProcessingOptions) -> CurveResult<Arc<Lut>> {
        opts.validate()?;
        let size = opts.lut_size_for(curve);
        let key = curve.cache_key(size);

        let cached = self.cache.lock().get(&key);
        if let Some(lut) = cached {
            self.telemetry.lock().cache_hits += 1;
            return Ok(lut);
        }
        self.telemetry.lock().cache_misses += 1;

        let lut = Arc::new(self.run(|| Lut::build_with_size(curve, size))?);
        self.cache.lock().insert(key, Arc::clone(&lut));
        Ok(lut)
    }

    /// Apply one curve to its own scope.
    ///
    /// `cancel` belongs to this call only and is checked between row bands.
    pub fn apply_curve(
        &self,
        curve: &Curve,
        input: &PixelView<'_>,
        output: &mut PixelViewMut<'_>,
        opts: &ProcessingOptions,
        cancel: Option<&CancelToken>,
    ) -> CurveResult<()> {
        let lut = self.generate_lut(curve, opts)?;
        let bindings = [LutBinding::new(&lut, curve.scope())];
        self.dispatch(&bindings, input, output, opts, cancel)
    }

    /// Apply several curves, each bound to its own scope. Later curves
    /// override earlier ones on shared channels.
    pub fn apply_multi_channel(
        &self,
        curves: &[Curve],
        input: &PixelView<'_>,
        output: &mut PixelViewMut<'_>,
        opts: &ProcessingOptions,
        cancel: Option<&CancelToken>,
    ) -> CurveResult<()> {
        let luts = curves
            .iter()
            .map(|c| self.generate_lut(c, opts))
            .collect::<CurveResult<Vec<_>>>()?;
        let bindings: Vec<LutBinding<'_>> = luts
            .iter()
            .zip(curves)
            .map(|(lut, curve)| LutBinding::new(lut, curve.scope()))
            .collect();
        self.dispatch(&bindings, input, output, opts, cancel)
    }

    /// Apply a prebuilt LUT with an explicit scope.
    pub fn apply_lut(
        &self,
        lut: &Lut,
        scope: ChannelScope,
        input: &PixelView<'_>,
        output: &mut PixelViewMut<'_>,
        opts: &ProcessingOptions,
        cancel: Option<&CancelToken>,
    ) -> CurveResult<()> {
        self.dispatch(&[LutBinding::new(lut, scope)], input, output, opts, cancel)
    }

    pub fn analyze(
        &self,
        view: &PixelView<'_>,
        config: &AnalysisConfig,
        cancel: Option<&CancelToken>,
    ) -> CurveResult<ImageStatistics> {
        let start = Instant::now();
        let stats = self.run(|| analyze_with_cancel(view, config, cancel))?;
        self.record_time(start);
        Ok(stats)
    }

    /// Synthesize curves from statistics, sized to the engine's LUT size.
    pub fn suggest(
        &self,
        stats: &ImageStatistics,
        params: &AiSuggestionParams,
    ) -> CurveResult<Suggestion> {
        let suggestion = synthesize(stats, params)?;
        let size = self.options.default_lut_size;
        Ok(Suggestion {
            master: suggestion.master.with_lut_size(size)?,
            channel_curves: suggestion
                .channel_curves
                .into_iter()
                .map(|c| c.with_lut_size(size))
                .collect::<CurveResult<Vec<_>>>()?,
        })
    }

    /// Refine `curve` against a reference image's levels.
    pub fn optimize(&self, curve: &Curve, reference: &ImageStatistics) -> CurveResult<Curve> {
        optimize_curve(curve, reference)
    }

    /// Film profile curve, sized to the engine's LUT size.
    pub fn film_emulation(&self, name: &str) -> CurveResult<Curve> {
        film_curve(name)?.with_lut_size(self.options.default_lut_size)
    }

    fn dispatch(
        &self,
        bindings: &[LutBinding<'_>],
        input: &PixelView<'_>,
        output: &mut PixelViewMut<'_>,
        opts: &ProcessingOptions,
        cancel: Option<&CancelToken>,
    ) -> CurveResult<()> {
        opts.validate()?;
        let in_g = input.geometry();
        let out_g = output.geometry();
        if !in_g.same_shape(out_g) {
            return Err(CurveError::InvalidParams(format!(
                "output {}x{}x{} does not match input {}x{}x{}",
                out_g.width, out_g.height, out_g.channels, in_g.width, in_g.height, in_g.channels
            )));
        }

        let start = Instant::now();
        let mut accelerated = false;
        let result = match (&self.accelerator, opts.use_acceleration) {
            (Some(acc), true) => match acc.apply(bindings, input, output) {
                Ok(()) => {
                    accelerated = true;
                    Ok(())
                }
                Err(CurveError::AcceleratorUnavailable) if !opts.require_acceleration => {
                    emit(
                        Severity::Warn,
                        &format!("accelerator {} declined, using software path", acc.name()),
                    );
                    self.apply_software(bindings, input, output, cancel)
                }
                Err(e) => Err(e),
            },
            (None, true) if opts.require_acceleration => Err(CurveError::AcceleratorUnavailable),
            _ => self.apply_software(bindings, input, output, cancel),
        };

        {
            let mut t = self.telemetry.lock();
            t.apply_calls += 1;
            if accelerated {
                t.accelerated_calls += 1;
            }
        }
        self.record_time(start);

        if let Err(e) = &result {
            emit(Severity::Error, &format!("apply failed: {}", e));
        }
        result
    }

    fn apply_software(
        &self,
        bindings: &[LutBinding<'_>],
        input: &PixelView<'_>,
        output: &mut PixelViewMut<'_>,
        cancel: Option<&CancelToken>,
    ) -> CurveResult<()> {
        let ctx = ApplyContext {
            transform: self.transform.as_deref(),
            cancel,
        };
        self.run(|| apply_luts(bindings, input, output, &ctx))
    }

    fn run<T, F>(&self, op: F) -> T
    where
        F: FnOnce() -> T + Send,
        T: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    fn record_time(&self, start: Instant) {
        if self.is_profiling() {
            let ms = start.elapsed().as_secs_f64() * 1000.0;
            self.telemetry.lock().last_ms = ms;
            tracing::trace!(ms, "operation timed");
        }
    }
}

static ENGINE: RwLock<Option<Engine>> = parking_lot::const_rwlock(None);

/// Create the shared engine. Calling it again while initialized is a no-op.
pub fn initialize(options: EngineOptions) -> CurveResult<()> {
    install(|| Engine::new(options))
}

/// Create the shared engine with an accelerator attached.
pub fn initialize_with_accelerator(
    options: EngineOptions,
    accelerator: Arc<dyn Accelerator>,
) -> CurveResult<()> {
    install(|| Engine::with_accelerator(options, accelerator))
}

fn install(build: impl FnOnce() -> CurveResult<Engine>) -> CurveResult<()> {
    let mut slot = ENGINE.write();
    if slot.is_some() {
        tracing::debug!("engine already initialized");
        return Ok(());
    }
    *slot = Some(build()?);
    emit(Severity::Info, "engine initialized");
    Ok(())
}

/// Tear down the shared engine. Waits for in-flight calls to finish.
pub fn cleanup() {
    if ENGINE.write().take().is_some() {
        emit(Severity::Info, "engine cleaned up");
    }
}

pub fn is_initialized() -> bool {
    ENGINE.read().is_some()
}

/// Run `f` against the shared engine.
///
/// `f` must not call [`initialize`] or [`cleanup`]; the engine lock is held
/// for the duration of the call.
///
/// # Errors
/// `NotInitialized` before [`initialize`] or after [`cleanup`], otherwise
/// whatever `f` returns.
pub fn with_engine<T>(f: impl FnOnce(&Engine) -> CurveResult<T>) -> CurveResult<T> {
    let guard = ENGINE.read();
    match guard.as_ref() {
        Some(engine) => f(engine),
        None => Err(CurveError::NotInitialized),
    }
}

/// False when no engine is initialized.
pub fn is_acceleration_available() -> bool {
    with_engine(|e| Ok(e.is_acceleration_available())).unwrap_or(false)
}

/// False when no engine is initialized.
pub fn is_ai_available() -> bool {
    with_engine(|e| Ok(e.is_ai_available())).unwrap_or(false)
}

/// 0 when no engine is initialized.
pub fn operator_count() -> usize {
    with_engine(|e| Ok(e.operator_count())).unwrap_or(0)
}

pub fn stats() -> CurveResult<PerformanceStats> {
    with_engine(|e| Ok(e.stats()))
}

pub fn set_profiling(enabled: bool) -> CurveResult<()> {
    with_engine(|e| {
        e.set_profiling(enabled);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{PixelBuffer, SampleFormat};
    use std::sync::atomic::AtomicUsize;

    /// Serializes tests that touch the shared engine.
    static GLOBAL_LOCK: Mutex<()> = parking_lot::const_mutex(());

    /// Writes 255 minus each input byte, ignoring the LUTs.
    struct Negate {
        calls: AtomicUsize,
    }

    impl Accelerator for Negate {
        fn name(&self) -> &str {
            "negate"
        }

        fn operator_count(&self) -> usize {
            3
        }

        fn supports_ai(&self) -> bool {
            true
        }

        fn apply(
            &self,
            _bindings: &[LutBinding<'_>],
            input: &PixelView<'_>,
            output: &mut PixelViewMut<'_>,
        ) -> CurveResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let g = *input.geometry();
            let row_bytes = g.row_bytes();
            for y in 0..g.height {
                let src = &input.row(y)[..row_bytes];
                let dst = &mut output.row_mut(y)[..row_bytes];
                for (d, s) in dst.iter_mut().zip(src) {
                    *d = 255 - s;
                }
            }
            Ok(())
        }
    }

    /// Always declines.
    struct Declines {
        calls: AtomicUsize,
    }

    impl Accelerator for Declines {
        fn name(&self) -> &str {
            "declines"
        }

        fn operator_count(&self) -> usize {
            1
        }

        fn apply(
            &self,
            _bindings: &[LutBinding<'_>],
            _input: &PixelView<'_>,
            _output: &mut PixelViewMut<'_>,
        ) -> CurveResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CurveError::AcceleratorUnavailable)
        }
    }

    fn rgb(width: u32, height: u32) -> PixelBuffer {
        let data: Vec<u8> = (0..width * height * 3).map(|i| (i * 7 % 256) as u8).collect();
        PixelBuffer::from_samples(width, height, 3, SampleFormat::U8, &data).unwrap()
    }

    fn invert_curve() -> Curve {
        Curve::new(
            &[
                crate::ControlPoint::new(0.0, 1.0),
                crate::ControlPoint::new(1.0, 0.0),
            ],
            crate::CurveType::Linear,
        )
        .unwrap()
    }

    fn software() -> ProcessingOptions {
        ProcessingOptions {
            use_acceleration: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_options_defaults() {
        let opts = EngineOptions::default();
        assert_eq!(opts.lut_cache_capacity, 32);
        assert_eq!(opts.default_lut_size, 4096);
        assert!(opts.validate().is_ok());

        let bad = EngineOptions {
            default_lut_size: 1,
            ..Default::default()
        };
        assert!(Engine::new(bad).is_err());
    }

    #[test]
    fn test_processing_options_validation() {
        assert!(ProcessingOptions::default().validate().is_ok());
        let bad_quality = ProcessingOptions {
            quality: 1.5,
            ..Default::default()
        };
        assert!(bad_quality.validate().is_err());
        let contradictory = ProcessingOptions {
            use_acceleration: false,
            require_acceleration: true,
            ..Default::default()
        };
        assert!(contradictory.validate().is_err());
    }

    #[test]
    fn test_realtime_lut_size() {
        let curve = Curve::linear();
        let mut opts = ProcessingOptions::default();
        assert_eq!(opts.lut_size_for(&curve), 4096);

        opts.real_time = true;
        assert_eq!(opts.lut_size_for(&curve), 1024);
        opts.quality = 0.0;
        assert_eq!(opts.lut_size_for(&curve), 256);
        opts.quality = 0.5;
        assert_eq!(opts.lut_size_for(&curve), 640);

        let small = Curve::linear().with_lut_size(300).unwrap();
        assert_eq!(opts.lut_size_for(&small), 300);
    }

    #[test]
    fn test_feature_settings_tagged() {
        let json = r#"{"feature":"Analysis","sample_step":4}"#;
        let settings: FeatureSettings = serde_json::from_str(json).unwrap();
        match &settings {
            FeatureSettings::Analysis(config) => {
                assert_eq!(config.sample_step, 4);
                assert_eq!(config.shadow_threshold, 0.01);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(settings.validate().is_ok());

        let bad: FeatureSettings =
            serde_json::from_str(r#"{"feature":"ToneCurve","quality":2.0}"#).unwrap();
        assert!(bad.validate().is_err());

        let suggestion: FeatureSettings =
            serde_json::from_str(r#"{"feature":"Suggestion","film_emulation":true}"#).unwrap();
        assert!(matches!(
            suggestion.validate(),
            Err(CurveError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_software_engine_capabilities() {
        let engine = Engine::new(EngineOptions::default()).unwrap();
        assert!(!engine.is_acceleration_available());
        assert!(!engine.is_ai_available());
        assert_eq!(engine.operator_count(), 0);
        assert_eq!(engine.stats(), PerformanceStats::default());
    }

    #[test]
    fn test_apply_curve_matches_free_function() {
        let engine = Engine::new(EngineOptions::default()).unwrap();
        let input = rgb(9, 5);
        let curve = Curve::s_curve(0.8).unwrap();

        let mut via_engine = PixelBuffer::new(9, 5, 3, SampleFormat::U8).unwrap();
        engine
            .apply_curve(&curve, &input.view(), &mut via_engine.view_mut(), &software(), None)
            .unwrap();

        let mut direct = PixelBuffer::new(9, 5, 3, SampleFormat::U8).unwrap();
        crate::apply_curve(
            &curve,
            &input.view(),
            &mut direct.view_mut(),
            &ApplyContext::default(),
        )
        .unwrap();

        assert_eq!(via_engine, direct);
    }

    #[test]
    fn test_lut_cache_hits_and_misses() {
        let engine = Engine::new(EngineOptions::default()).unwrap();
        let curve = Curve::s_curve(0.5).unwrap();
        let opts = ProcessingOptions::default();

        let a = engine.generate_lut(&curve, &opts).unwrap();
        let b = engine.generate_lut(&curve.clone(), &opts).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let stats = engine.stats();
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.memory_used_bytes, a.memory_bytes());

        // Scope does not change the table
        let blue = curve.clone().with_scope(ChannelScope::Blue);
        let c = engine.generate_lut(&blue, &opts).unwrap();
        assert!(Arc::ptr_eq(&a, &c));

        engine.clear_cache();
        assert_eq!(engine.stats().memory_used_bytes, 0);
    }

    #[test]
    fn test_lut_cache_clears_when_full() {
        let engine = Engine::new(EngineOptions {
            lut_cache_capacity: 2,
            ..Default::default()
        })
        .unwrap();
        let opts = ProcessingOptions::default();
        let curves: Vec<Curve> = [0.1, 0.2, 0.3]
            .iter()
            .map(|&s| Curve::s_curve(s).unwrap())
            .collect();
        for c in &curves {
            engine.generate_lut(c, &opts).unwrap();
        }
        // Third insert cleared the first two
        engine.generate_lut(&curves[2], &opts).unwrap();
        engine.generate_lut(&curves[0], &opts).unwrap();
        let stats = engine.stats();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 4);
    }

    #[test]
    fn test_cache_disabled() {
        let engine = Engine::new(EngineOptions {
            lut_cache_capacity: 0,
            ..Default::default()
        })
        .unwrap();
        let curve = Curve::linear();
        let opts = ProcessingOptions::default();
        engine.generate_lut(&curve, &opts).unwrap();
        engine.generate_lut(&curve, &opts).unwrap();
        assert_eq!(engine.stats().cache_misses, 2);
        assert_eq!(engine.stats().memory_used_bytes, 0);
    }

    #[test]
    fn test_multi_channel_later_wins() {
        let engine = Engine::new(EngineOptions::default()).unwrap();
        let input = rgb(4, 4);
        let curves = vec![
            invert_curve().with_scope(ChannelScope::Red),
            Curve::linear().with_scope(ChannelScope::Red),
        ];
        let mut out = PixelBuffer::new(4, 4, 3, SampleFormat::U8).unwrap();
        engine
            .apply_multi_channel(&curves, &input.view(), &mut out.view_mut(), &software(), None)
            .unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_multi_channel_empty_is_error() {
        let engine = Engine::new(EngineOptions::default()).unwrap();
        let input = rgb(2, 2);
        let mut out = PixelBuffer::new(2, 2, 3, SampleFormat::U8).unwrap();
        assert!(matches!(
            engine.apply_multi_channel(&[], &input.view(), &mut out.view_mut(), &software(), None),
            Err(CurveError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_geometry_mismatch() {
        let engine = Engine::new(EngineOptions::default()).unwrap();
        let input = rgb(4, 4);
        let mut out = PixelBuffer::new(4, 3, 3, SampleFormat::U8).unwrap();
        let lut = Lut::identity(256).unwrap();
        assert!(matches!(
            engine.apply_lut(
                &lut,
                ChannelScope::Rgb,
                &input.view(),
                &mut out.view_mut(),
                &software(),
                None
            ),
            Err(CurveError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_accelerator_serves_apply() {
        let acc = Arc::new(Negate {
            calls: AtomicUsize::new(0),
        });
        let engine = Engine::with_accelerator(EngineOptions::default(), acc.clone()).unwrap();
        assert!(engine.is_acceleration_available());
        assert!(engine.is_ai_available());
        assert_eq!(engine.operator_count(), 3);

        let input = rgb(3, 2);
        let mut out = PixelBuffer::new(3, 2, 3, SampleFormat::U8).unwrap();
        let defaults = ProcessingOptions::default();
        engine
            .apply_curve(&invert_curve(), &input.view(), &mut out.view_mut(), &defaults, None)
            .unwrap();
        assert_eq!(acc.calls.load(Ordering::SeqCst), 1);
        assert_eq!(out.data()[0], 255 - input.data()[0]);
        assert_eq!(engine.stats().accelerator_utilization, 1.0);

        // Opting out skips the accelerator
        engine
            .apply_curve(&invert_curve(), &input.view(), &mut out.view_mut(), &software(), None)
            .unwrap();
        assert_eq!(acc.calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.stats().accelerator_utilization, 0.5);
    }

    #[test]
    fn test_declining_accelerator_falls_back() {
        let acc = Arc::new(Declines {
            calls: AtomicUsize::new(0),
        });
        let engine = Engine::with_accelerator(EngineOptions::default(), acc.clone()).unwrap();
        assert!(!engine.is_ai_available());

        let input = rgb(5, 5);
        let curve = Curve::s_curve(0.4).unwrap();
        let mut out = PixelBuffer::new(5, 5, 3, SampleFormat::U8).unwrap();
        let defaults = ProcessingOptions::default();
        engine
            .apply_curve(&curve, &input.view(), &mut out.view_mut(), &defaults, None)
            .unwrap();
        assert_eq!(acc.calls.load(Ordering::SeqCst), 1);

        let mut expected = PixelBuffer::new(5, 5, 3, SampleFormat::U8).unwrap();
        let ctx = ApplyContext::default();
        crate::apply_curve(&curve, &input.view(), &mut expected.view_mut(), &ctx).unwrap();
        assert_eq!(out, expected);
        assert_eq!(engine.stats().accelerator_utilization, 0.0);

        let required = ProcessingOptions {
            require_acceleration: true,
            ..Default::default()
        };
        assert_eq!(
            engine.apply_curve(&curve, &input.view(), &mut out.view_mut(), &required, None),
            Err(CurveError::AcceleratorUnavailable)
        );
    }

    #[test]
    fn test_require_acceleration_without_accelerator() {
        let engine = Engine::new(EngineOptions::default()).unwrap();
        let input = rgb(2, 2);
        let mut out = PixelBuffer::new(2, 2, 3, SampleFormat::U8).unwrap();
        let required = ProcessingOptions {
            require_acceleration: true,
            ..Default::default()
        };
        let linear = Curve::linear();
        assert_eq!(
            engine.apply_curve(&linear, &input.view(), &mut out.view_mut(), &required, None),
            Err(CurveError::AcceleratorUnavailable)
        );
        // Plain use_acceleration degrades silently
        let defaults = ProcessingOptions::default();
        engine
            .apply_curve(&linear, &input.view(), &mut out.view_mut(), &defaults, None)
            .unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_dedicated_pool_matches_global() {
        let pooled = Engine::new(EngineOptions {
            thread_count: 2,
            ..Default::default()
        })
        .unwrap();
        let plain = Engine::new(EngineOptions::default()).unwrap();
        let input = rgb(31, 130);
        let curve = Curve::s_curve(0.9).unwrap();

        let mut a = PixelBuffer::new(31, 130, 3, SampleFormat::U8).unwrap();
        let mut b = PixelBuffer::new(31, 130, 3, SampleFormat::U8).unwrap();
        pooled
            .apply_curve(&curve, &input.view(), &mut a.view_mut(), &software(), None)
            .unwrap();
        plain
            .apply_curve(&curve, &input.view(), &mut b.view_mut(), &software(), None)
            .unwrap();
        assert_eq!(a, b);

        let config = AnalysisConfig::default();
        assert_eq!(
            pooled.analyze(&input.view(), &config, None).unwrap(),
            plain.analyze(&input.view(), &config, None).unwrap()
        );
    }

    #[test]
    fn test_cancel_token_stops_passes() {
        let engine = Engine::new(EngineOptions::default()).unwrap();
        let input = rgb(8, 8);
        let mut out = PixelBuffer::new(8, 8, 3, SampleFormat::U8).unwrap();
        let curve = Curve::s_curve(0.5).unwrap();
        let config = AnalysisConfig::default();

        let token = CancelToken::new();
        token.cancel();
        let cancelled = engine.apply_curve(
            &curve,
            &input.view(),
            &mut out.view_mut(),
            &software(),
            Some(&token),
        );
        assert_eq!(cancelled, Err(CurveError::Cancelled));
        assert_eq!(
            engine.analyze(&input.view(), &config, Some(&token)),
            Err(CurveError::Cancelled)
        );

        // A cancelled token does not leak into later calls on the same engine
        assert!(engine.analyze(&input.view(), &config, None).is_ok());
        let fresh = CancelToken::new();
        engine
            .apply_curve(&curve, &input.view(), &mut out.view_mut(), &software(), Some(&fresh))
            .unwrap();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_profiling_records_time() {
        let engine = Engine::new(EngineOptions::default()).unwrap();
        assert!(!engine.is_profiling());
        let input = rgb(256, 256);
        let mut out = PixelBuffer::new(256, 256, 3, SampleFormat::U8).unwrap();
        let curve = Curve::s_curve(0.7).unwrap();

        // Off: nothing is recorded
        engine.telemetry.lock().last_ms = -1.0;
        engine
            .apply_curve(&curve, &input.view(), &mut out.view_mut(), &software(), None)
            .unwrap();
        assert_eq!(engine.stats().processing_time_ms, -1.0);

        engine.set_profiling(true);
        assert!(engine.is_profiling());
        engine
            .apply_curve(&curve, &input.view(), &mut out.view_mut(), &software(), None)
            .unwrap();
        let recorded = engine.stats().processing_time_ms;
        assert!(recorded > 0.0, "{}", recorded);

        // Turning it back off keeps the last recorded value
        engine.set_profiling(false);
        engine
            .apply_curve(&curve, &input.view(), &mut out.view_mut(), &software(), None)
            .unwrap();
        assert_eq!(engine.stats().processing_time_ms, recorded);

        engine.reset_stats();
        assert_eq!(engine.stats().processing_time_ms, 0.0);
    }

    #[test]
    fn test_suggest_and_film_use_engine_lut_size() {
        let engine = Engine::new(EngineOptions {
            default_lut_size: 1024,
            ..Default::default()
        })
        .unwrap();
        let input = rgb(16, 16);
        let stats = engine
            .analyze(&input.view(), &AnalysisConfig::default(), None)
            .unwrap();
        let params = AiSuggestionParams {
            auto_color: true,
            ..Default::default()
        };
        let suggestion = engine.suggest(&stats, &params).unwrap();
        assert_eq!(suggestion.master.lut_size(), 1024);
        assert!(suggestion.channel_curves.iter().all(|c| c.lut_size() == 1024));

        let film = engine.film_emulation("ilford").unwrap();
        assert_eq!(film.lut_size(), 1024);
        assert!(engine.film_emulation("nope").is_err());

        let optimized = engine.optimize(&film, &stats).unwrap();
        assert_eq!(optimized.lut_size(), 1024);
    }

    #[test]
    fn test_global_lifecycle() {
        let _guard = GLOBAL_LOCK.lock();
        cleanup();
        assert!(!is_initialized());
        assert_eq!(
            with_engine(|e| Ok(e.operator_count())),
            Err(CurveError::NotInitialized)
        );
        assert_eq!(stats(), Err(CurveError::NotInitialized));
        assert_eq!(set_profiling(true), Err(CurveError::NotInitialized));
        assert!(!is_acceleration_available());
        assert_eq!(operator_count(), 0);

        initialize(EngineOptions::default()).unwrap();
        assert!(is_initialized());
        // Second call keeps the first engine
        initialize(EngineOptions {
            lut_cache_capacity: 1,
            ..Default::default()
        })
        .unwrap();
        let capacity = with_engine(|e| Ok(e.options().lut_cache_capacity)).unwrap();
        assert_eq!(capacity, 32);

        let input = rgb(4, 4);
        let mut out = PixelBuffer::new(4, 4, 3, SampleFormat::U8).unwrap();
        with_engine(|e| {
            e.apply_curve(&Curve::linear(), &input.view(), &mut out.view_mut(), &software(), None)
        })
        .unwrap();
        assert_eq!(out, input);
        assert_eq!(stats().unwrap().cache_misses, 1);

        cleanup();
        assert!(!is_initialized());
        assert_eq!(
            with_engine(|e| e.analyze(&input.view(), &AnalysisConfig::default(), None)),
            Err(CurveError::NotInitialized)
        );
    }

    #[test]
    fn test_global_accelerator_capabilities() {
        let _guard = GLOBAL_LOCK.lock();
        cleanup();
        let acc = Arc::new(Negate {
            calls: AtomicUsize::new(0),
        });
        initialize_with_accelerator(EngineOptions::default(), acc).unwrap();
        assert!(is_acceleration_available());
        assert!(is_ai_available());
        assert_eq!(operator_count(), 3);
        set_profiling(true).unwrap();
        assert!(with_engine(|e| Ok(e.is_profiling())).unwrap());
        cleanup();
        assert!(!is_ai_available());
    }
}

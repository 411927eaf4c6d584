// In-process JavaScript runner on an embedded QuickJS runtime
use crate::config::LanguageConfig;
use crate::console::{ConsoleCapture, ConsoleLevel};
use crate::runners::Runner;
use crate::usage::average_ram_usage;
use async_trait::async_trait;
use grader_common::types::{GradingReport, TestCase, TestResult};
use grader_common::value::{coerce, equals, CoercedValue};
use rquickjs::{CatchResultExt, CaughtError, Context, Ctx, Function, Runtime, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument, warn};

const TIMEOUT_MESSAGE: &str = "Script execution timed out.";
const MAX_STACK_BYTES: usize = 512 * 1024;

/// Name of the single host function visible to the prelude
const CAPTURE_FN: &str = "__grader_capture";

/// Installs `console` on top of the injected capture function, then removes
/// the function from the global scope so user code only sees `console`.
const CONSOLE_PRELUDE: &str = r#"
(() => {
  const capture = globalThis.__grader_capture;
  delete globalThis.__grader_capture;
  const render = (value) => {
    if (typeof value === 'string') return value;
    if (value === undefined) return 'undefined';
    if (value === null || typeof value !== 'object' && typeof value !== 'function' && typeof value !== 'symbol') {
      return String(value);
    }
    if (typeof value === 'function') return '[Function]';
    if (typeof value === 'symbol') return value.toString();
    try {
      const json = JSON.stringify(value);
      return json === undefined ? String(value) : json;
    } catch (_) {
      return String(value);
    }
  };
  const emit = (level) => (...args) => { capture(level, args.map(render).join(' ')); };
  globalThis.console = Object.freeze({
    log: emit('log'),
    info: emit('info'),
    warn: emit('warn'),
    error: emit('error'),
    debug: emit('debug'),
  });
})();
"#;

/// Resource bounds for one sandbox
#[derive(Debug, Clone)]
pub struct SandboxLimits {
    pub memory_limit_bytes: usize,
    /// Deadline for each test evaluation
    pub timeout: Duration,
    /// Deadline for the definition pass
    pub load_timeout: Duration,
}

impl SandboxLimits {
    pub fn from_config(config: &LanguageConfig) -> Self {
        Self {
            memory_limit_bytes: config.memory_limit_bytes() as usize,
            timeout: config.timeout(),
            load_timeout: config.load_timeout(),
        }
    }
}

/// A disposable QuickJS runtime bounded in heap and wall-clock time.
///
/// The interrupt handler polls a shared deadline; once it passes, QuickJS
/// raises an uncatchable exception and the evaluation unwinds. Dropping the
/// sandbox frees the whole runtime.
pub struct JsSandbox {
    context: Context,
    runtime: Runtime,
    deadline: Arc<Mutex<Option<Instant>>>,
    interrupted: Arc<AtomicBool>,
}

impl JsSandbox {
    pub fn new(limits: &SandboxLimits, console: ConsoleCapture) -> rquickjs::Result<Self> {
        let runtime = Runtime::new()?;
        runtime.set_memory_limit(limits.memory_limit_bytes);
        runtime.set_max_stack_size(MAX_STACK_BYTES);

        let deadline: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
        let interrupted = Arc::new(AtomicBool::new(false));
        {
            let deadline = deadline.clone();
            let interrupted = interrupted.clone();
            runtime.set_interrupt_handler(Some(Box::new(move || {
                let expired = match deadline.lock() {
                    Ok(guard) => guard.map_or(false, |at| Instant::now() >= at),
                    Err(_) => true,
                };
                if expired {
                    interrupted.store(true, Ordering::SeqCst);
                }
                expired
            })));
        }

        let context = Context::full(&runtime)?;
        context.with(|ctx| -> rquickjs::Result<()> {
            let capture = Function::new(ctx.clone(), move |level: String, line: String| {
                console.record(ConsoleLevel::parse(&level), &line);
            })?;
            ctx.globals().set(CAPTURE_FN, capture)?;
            ctx.eval::<(), _>(CONSOLE_PRELUDE)?;
            Ok(())
        })?;

        Ok(Self {
            context,
            runtime,
            deadline,
            interrupted,
        })
    }

    /// Definition pass: run the submission once at top level
    pub fn load(&self, source: &str, timeout: Duration) -> Result<(), String> {
        self.guarded(timeout, |ctx| {
            ctx.eval::<Value, _>(source)
                .catch(&ctx)
                .map(|_| ())
                .map_err(describe_caught)
        })
    }

    /// Evaluate one test input and convert the completion value
    pub fn evaluate(&self, input: &str, timeout: Duration) -> Result<CoercedValue, String> {
        self.guarded(timeout, |ctx| {
            let value = ctx
                .eval::<Value, _>(input)
                .catch(&ctx)
                .map_err(describe_caught)?;
            to_coerced(&ctx, value)
        })
    }

    /// Bytes currently allocated by the runtime
    pub fn heap_used(&self) -> u64 {
        self.runtime.memory_usage().memory_used_size.max(0) as u64
    }

    fn guarded<T>(
        &self,
        timeout: Duration,
        f: impl for<'js> FnOnce(Ctx<'js>) -> Result<T, String>,
    ) -> Result<T, String> {
        self.set_deadline(Some(Instant::now() + timeout));
        self.interrupted.store(false, Ordering::SeqCst);

        let outcome = self.context.with(f);

        self.set_deadline(None);
        if self.interrupted.swap(false, Ordering::SeqCst) {
            return Err(TIMEOUT_MESSAGE.to_string());
        }
        outcome
    }

    fn set_deadline(&self, at: Option<Instant>) {
        if let Ok(mut deadline) = self.deadline.lock() {
            *deadline = at;
        }
    }
}

fn describe_caught(caught: CaughtError<'_>) -> String {
    match caught {
        CaughtError::Exception(exception) => exception
            .message()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "Uncaught exception".to_string()),
        CaughtError::Value(value) => match value.as_string() {
            Some(s) => s.to_string().unwrap_or_else(|_| "Uncaught exception".to_string()),
            None => format!("Uncaught {}", value.type_name()),
        },
        CaughtError::Error(e) => e.to_string(),
    }
}

/// Map a completion value onto the coercer's variants.
///
/// Arrays and plain objects cross the boundary as JSON; functions and symbols
/// cannot be transferred and count as an error for that test.
fn to_coerced<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> Result<CoercedValue, String> {
    if value.is_undefined() {
        return Ok(CoercedValue::Undefined);
    }
    if value.is_null() {
        return Ok(CoercedValue::Null);
    }
    if let Some(b) = value.as_bool() {
        return Ok(CoercedValue::Bool(b));
    }
    if let Some(n) = value.as_number() {
        return Ok(CoercedValue::Number(n));
    }
    if let Some(s) = value.as_string() {
        return s.to_string().map(CoercedValue::String).map_err(|e| e.to_string());
    }
    if value.is_function() || value.is_symbol() {
        return Err(format!("Result of type {} cannot be transferred", value.type_name()));
    }

    let json = ctx
        .json_stringify(value)
        .catch(ctx)
        .map_err(describe_caught)?
        .ok_or_else(|| "Result cannot be serialized".to_string())?
        .to_string()
        .map_err(|e| e.to_string())?;

    serde_json::from_str::<serde_json::Value>(&json)
        .map(CoercedValue::from_json)
        .map_err(|e| format!("Result cannot be serialized: {}", e))
}

/// Runs JavaScript submissions in a fresh sandbox per run
pub struct InProcessRunner {
    limits: SandboxLimits,
}

impl InProcessRunner {
    pub fn new(limits: SandboxLimits) -> Self {
        Self { limits }
    }
}

#[async_trait]
impl Runner for InProcessRunner {
    #[instrument(skip_all, fields(test_count = tests.len()))]
    async fn run(&self, tests: &[TestCase], source: &str) -> GradingReport {
        let limits = self.limits.clone();
        let tests = tests.to_vec();
        let source = source.to_string();

        // QuickJS evaluation is synchronous and may spin until its deadline
        match tokio::task::spawn_blocking(move || run_in_sandbox(&limits, &tests, &source)).await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "JavaScript sandbox task failed");
                GradingReport::failure(format!("Sandbox crashed: {}", e))
            }
        }
    }
}

/// Full in-process run; the sandbox lives exactly as long as this call
pub fn run_in_sandbox(limits: &SandboxLimits, tests: &[TestCase], source: &str) -> GradingReport {
    let console = ConsoleCapture::new();

    let sandbox = match JsSandbox::new(limits, console.clone()) {
        Ok(sandbox) => sandbox,
        Err(e) => {
            error!(error = %e, "Failed to create JavaScript sandbox");
            return GradingReport::failure(format!("Failed to create sandbox: {}", e));
        }
    };

    if let Err(message) = sandbox.load(source, limits.load_timeout) {
        debug!(error = %message, "Submission failed to load");
        return GradingReport::failure(message);
    }

    let mut console_output = console.drain_lines();
    let mut results = Vec::with_capacity(tests.len());

    for (index, test) in tests.iter().enumerate() {
        let expected = coerce(&test.expected_output);
        let before = sandbox.heap_used();

        match sandbox.evaluate(&test.input, limits.timeout) {
            Ok(actual) => {
                let mem_usage = sandbox.heap_used().saturating_sub(before);
                let passed = equals(&actual, &expected);
                debug!(test = index, passed, mem_usage, "Test evaluated");

                results.push(TestResult {
                    input: test.input.clone(),
                    expected_output: expected,
                    actual_output: Some(actual),
                    passed,
                    mem_usage: Some(mem_usage),
                    error: None,
                    display_value: test.display_value.clone(),
                });
            }
            Err(message) => {
                warn!(test = index, error = %message, "Test evaluation failed");
                results.push(TestResult::errored(test, expected, message));
            }
        }

        console_output.extend(console.drain_lines());
    }

    let average = average_ram_usage(&results);
    GradingReport::completed(results, average, console_output)
}

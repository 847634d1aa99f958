//! Debug script to see what the analyzer produces.
//!
//! With no arguments an embedded sample is analyzed; otherwise the first
//! argument is read as a file. Set `RUST_LOG=awaitly_analyzer=trace` to see
//! call classification.

use std::path::Path;
use awaitly_analyzer::{analyze_file, analyze_source, AnalyzeOptions};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

const SAMPLE: &str = r#"
import { createWorkflow, allAsync, when } from "awaitly";

const checkout = createWorkflow({ fetchUser, fetchCart, charge, notify });

await checkout(async (step, deps) => {
  const user = await step(() => deps.fetchUser(userId), { key: "user", name: "Load user" });

  const [cart, prefs] = await step.parallel("Load context", () =>
    allAsync([deps.fetchCart(user.id), deps.fetchPrefs(user.id)])
  );

  for (const item of cart.items) {
    await step.retry(() => deps.reserve(item), { attempts: 3, backoff: "exponential" });
  }

  await when(prefs.notify, () => step(() => deps.notify(user)));
  return step(() => deps.charge(cart));
});
"#;

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let options = AnalyzeOptions::default();
    let analysis = match std::env::args().nth(1) {
        Some(path) => analyze_file(Path::new(&path), &options)?,
        None => analyze_source(SAMPLE, "sample.ts", &options)?,
    };

    for warning in &analysis.warnings {
        eprintln!("warning[{:?}]: {}", warning.code, warning.message);
    }
    let json = serde_json::to_string_pretty(&analysis).into_diagnostic()?;
    println!("{}", json);
    Ok(())
}

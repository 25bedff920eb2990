use anyhow::Result;

use citetrack_types::EvaluationRecord;

/// Helper to assert a model's citation rate meets a threshold.
///
/// Use this in your `#[tokio::test]` functions.
///
/// # Example
/// ```ignore
/// #[tokio::test]
/// async fn test_sonar_cites_us() -> Result<()> {
///     let evaluator = Evaluator::builder()
///         .provider(provider)
///         .models(models)
///         .build()?;
///
///     let records = evaluator.evaluate(&prompts, &["acme.com"], &api_key, None).await?;
///
///     // At least half of the prompts should cite a tracked domain
///     assert_citation_rate(&records[0], 0.5)?;
///
///     Ok(())
/// }
/// ```
pub fn assert_citation_rate(record: &EvaluationRecord, min_rate: f64) -> Result<()> {
    let rate = record.citation_rate();
    if rate < min_rate {
        anyhow::bail!(
            "Citation check failed for {}: rate {:.1}% is below threshold {:.1}%\n{}",
            record.model,
            rate * 100.0,
            min_rate * 100.0,
            record.summary_table()
        );
    }
    Ok(())
}

/// Helper to assert a prompt's answer cited `domain` among the tracked targets.
pub fn assert_cited(record: &EvaluationRecord, prompt: &str, domain: &str) -> Result<()> {
    let Some(result) = record.results.iter().find(|r| r.prompt == prompt) else {
        anyhow::bail!("Prompt {:?} was not evaluated for {}", prompt, record.model);
    };
    if !result.matches.iter().any(|m| m.domain == domain) {
        anyhow::bail!(
            "Expected {} to cite {} for {:?}, cited: {:?}\n{}",
            record.model,
            domain,
            prompt,
            result.domains,
            record.summary_table()
        );
    }
    Ok(())
}

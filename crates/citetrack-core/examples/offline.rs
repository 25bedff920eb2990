use anyhow::Result;
use citetrack_core::{format_provider_table, provider_fn, Evaluator, ModelConfig};
use serde_json::json;

// Runs the whole pipeline against a canned provider, no network or API key needed.
#[tokio::main]
async fn main() -> Result<()> {
	let provider = provider_fn(|_key, model, prompt| {
		let model = model.model.clone();
		let prompt = prompt.to_string();
		async move {
			let answer = json!({
				"query": prompt,
				"results": [
					{ "agency": "Example", "domain": "example.org", "comment": "Reference guide https://example.org/guide" },
					{ "agency": "Acme", "domain": "www.acme.com", "comment": format!("{model} likes https://acme.com/pricing") },
				]
			});
			Ok(format!("Sure, here you go:\n{answer}\nHope that helps."))
		}
	});

	let evaluator = Evaluator::builder()
		.provider(provider)
		.add_model(ModelConfig::new("perplexity/sonar").with_label("Perplexity Sonar"))
		.add_model(ModelConfig::new("openai/gpt-4o-mini:online"))
		.build()?;

	let prompts = ["best pricing tools", "cheapest pricing tools"];
	let targets = ["acme.com/pricing", "https://docs.acme.com"];
	let records = evaluator.evaluate(&prompts, &targets, "offline", None).await?;

	for record in &records {
		println!("{}\n", record.summary_table());
		println!("{}\n", format_provider_table(record));
	}
	Ok(())
}

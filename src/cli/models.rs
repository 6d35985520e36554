use sutta_agent::config::SuttaConfig;
use sutta_agent::models::{LlmCatalog, ModelCatalog};

/// List the models the agent can use with the current configuration and keys.
pub fn models(config: &SuttaConfig) {
    let catalog = LlmCatalog::from_env(config.llm.clone(), config.agent.llm_timeout());
    let models = catalog.available_models();

    println!("Available models:");
    for model in &models {
        let default = if model.id == config.llm.default_model {
            " (default)"
        } else {
            ""
        };
        let cost = if model.is_free { "free" } else { "paid" };
        println!("  {:<45} {} [{cost}]{default}", model.id, model.display_name);
        println!("  {:<45} {}", "", model.description);
    }

    if !models.iter().any(|m| m.id == config.llm.default_model) {
        println!();
        println!(
            "WARNING: default model {} is not available. Set llm.default_model or SUTTA_MODEL.",
            config.llm.default_model
        );
    }
    println!();
    println!("Hosted models appear when OPENAI_API_KEY or OPENROUTER_API_KEY is set.");
}

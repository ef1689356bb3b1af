use super::{parse_pairs, Workspace};
use finagent_core::{DispatchOutcome, DispatchRequest, Source};
use std::path::Path;

fn format_sources(sources: &[Source]) -> String {
    let mut out = String::from("Sources:");
    for (i, s) in sources.iter().enumerate() {
        out.push_str(&format!(
            "\n  {}. {} [{} / {}] relevance {:.2}%",
            i + 1,
            s.source,
            s.doc_type,
            s.loan_type,
            s.relevance
        ));
    }
    out
}

fn cache_note(save_requested: bool) -> &'static str {
    if save_requested {
        "(served from cache; no campaign saved, ask again after `finagent cache clear` to regenerate)"
    } else {
        "(served from cache)"
    }
}

pub fn run(
    query: &str,
    session: &str,
    results: Option<usize>,
    filters: &[String],
    save_campaign: Option<&Path>,
) -> anyhow::Result<()> {
    let workspace = Workspace::load()?;
    let filters = parse_pairs(filters)?;
    let dispatcher = workspace.dispatcher()?;

    let mut request = DispatchRequest::new(query, session);
    if let Some(n) = results {
        request = request.with_result_count(n);
    }
    if !filters.is_empty() {
        request = request.with_filters(&filters);
    }

    let outcome = dispatcher.dispatch(&request)?;

    match &outcome {
        DispatchOutcome::Knowledge(answer) => {
            println!("{}", answer.answer);
            if !answer.sources.is_empty() {
                println!();
                println!("{}", format_sources(&answer.sources));
            }
        }
        DispatchOutcome::Marketing(campaign) => {
            println!("{}", campaign.render());
            if let Some(dir) = save_campaign {
                let path = campaign.save(dir)?;
                println!();
                println!("Campaign saved to {}", path.display());
            }
        }
        DispatchOutcome::Cached { answer } => {
            println!("{answer}");
            println!();
            println!("{}", cache_note(save_campaign.is_some()));
        }
    }

    Ok(())
}

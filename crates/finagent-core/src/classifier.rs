//! Routes a query to the knowledge or marketing responder

use crate::collaborators::{ChatMessage, CollaboratorError, GenerationRequest, TextGenerator};
use crate::settings::Settings;
use finagent_telemetry::AgentKind;
use std::sync::Arc;

const SYSTEM_PROMPT: &str = "You are a query classifier.";

pub fn classification_prompt(query: &str) -> String {
    format!(
        "You are a query classifier for a banking AI system.

**USER QUERY:** {query}

**TASK:** Classify this query into ONE of these categories:

1. **knowledge** - User wants information about:
   - Product features, eligibility, documents required
   - How to apply, loan process
   - Interest rates, fees, terms
   - Answering questions about banking products

2. **marketing** - User wants to:
   - Generate marketing campaigns
   - Create promotional content
   - Write social media posts, emails, SMS
   - Design marketing materials

**RESPOND WITH ONLY ONE WORD:** knowledge OR marketing

**CLASSIFICATION:**"
    )
}

/// Anything that does not mention "marketing" is a knowledge query
pub fn parse_classification(raw: &str) -> AgentKind {
    if raw.to_lowercase().contains("marketing") {
        AgentKind::Marketing
    } else {
        AgentKind::Knowledge
    }
}

pub struct QueryClassifier {
    generator: Arc<dyn TextGenerator>,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl QueryClassifier {
    pub fn new(generator: Arc<dyn TextGenerator>, settings: &Settings) -> Self {
        Self {
            generator,
            model: settings.model.clone(),
            temperature: settings.classifier_temperature,
            max_tokens: settings.classifier_max_tokens,
        }
    }

    pub fn classify(&self, query: &str) -> Result<AgentKind, CollaboratorError> {
        let request = GenerationRequest {
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(classification_prompt(query)),
            ],
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let raw = self.generator.generate(&request)?;
        let kind = parse_classification(raw.trim());
        tracing::debug!(raw = raw.trim(), agent = %kind, "query classified");
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Canned {
        reply: String,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl TextGenerator for Canned {
        fn generate(&self, request: &GenerationRequest) -> Result<String, CollaboratorError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.reply.clone())
        }
    }

    fn classifier(reply: &str) -> (QueryClassifier, Arc<Canned>) {
        let generator = Arc::new(Canned {
            reply: reply.to_string(),
            seen: Mutex::new(Vec::new()),
        });
        (QueryClassifier::new(generator.clone(), &Settings::new()), generator)
    }

    #[test]
    fn test_parse_classification() {
        assert_eq!(parse_classification("marketing"), AgentKind::Marketing);
        assert_eq!(parse_classification(" MARKETING."), AgentKind::Marketing);
        assert_eq!(parse_classification("This is marketing"), AgentKind::Marketing);
        assert_eq!(parse_classification("knowledge"), AgentKind::Knowledge);
        assert_eq!(parse_classification(""), AgentKind::Knowledge);
        assert_eq!(parse_classification("I'm not sure"), AgentKind::Knowledge);
    }

    #[test]
    fn test_classify_sends_fixed_prompt() {
        let (classifier, generator) = classifier("Marketing");
        let kind = classifier
            .classify("Write an SMS for young professionals")
            .unwrap();
        assert_eq!(kind, AgentKind::Marketing);

        let seen = generator.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].messages[0].content, SYSTEM_PROMPT);
        assert!(seen[0].messages[1]
            .content
            .contains("Write an SMS for young professionals"));
        assert_eq!(seen[0].temperature, 0.1);
        assert_eq!(seen[0].max_tokens, 10);
    }

    #[test]
    fn test_unexpected_reply_defaults_to_knowledge() {
        let (classifier, _) = classifier("support");
        assert_eq!(classifier.classify("hello").unwrap(), AgentKind::Knowledge);
    }
}

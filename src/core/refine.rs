use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::core::classify::{DeletionTarget, EditIntent, classify};
use crate::core::orchestrator::GenerationOrchestrator;
use crate::core::paragraph::{ParagraphedText, TextError};
use crate::core::prompts::PromptLibrary;
use crate::core::provider::ProviderError;
use crate::store::types::RecordKind;

#[derive(Debug, Error)]
pub enum RefineError {
    /// The provider timed out mid-edit. Never converted into fallback
    /// text: an edit must change the reviewed draft or leave it alone.
    #[error("refinement timed out")]
    Timeout,
    #[error("refinement provider call failed: {0}")]
    Provider(ProviderError),
    #[error("provider returned an empty rewrite")]
    EmptyResult,
    #[error(transparent)]
    Text(#[from] TextError),
}

impl From<ProviderError> for RefineError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Timeout(_) => RefineError::Timeout,
            other => RefineError::Provider(other),
        }
    }
}

/// Applies a natural-language edit instruction to previously generated
/// text. The instruction is classified first so that structural edits
/// (deletion) never touch the provider and targeted edits can only change
/// the paragraph they name.
pub struct RefinementEngine {
    orchestrator: Arc<GenerationOrchestrator>,
    prompts: Arc<PromptLibrary>,
}

impl RefinementEngine {
    pub fn new(orchestrator: Arc<GenerationOrchestrator>, prompts: Arc<PromptLibrary>) -> Self {
        Self {
            orchestrator,
            prompts,
        }
    }

    pub async fn refine(&self, prior: &str, instruction: &str) -> Result<String, RefineError> {
        let text = ParagraphedText::parse(prior);
        let intent = classify(instruction);
        info!(?intent, paragraphs = text.len(), "refining draft");

        match intent {
            EditIntent::TargetedEdit(index) if index <= text.len() => {
                self.rewrite_paragraph(&text, index, instruction).await
            }
            EditIntent::TargetedEdit(index) => {
                // The ordinal points past the draft; treat it like any
                // other unresolvable target.
                warn!(index, len = text.len(), "ordinal out of range, editing whole document");
                self.rewrite_document(&text, instruction).await
            }
            EditIntent::Deletion(target) => match self.resolve_deletion(&text, &target) {
                Some(indices) => Ok(text.remove_many(&indices)?.serialize()),
                None => {
                    warn!("no deletion target resolved, editing whole document");
                    self.rewrite_document(&text, instruction).await
                }
            },
            EditIntent::Insertion(topic) => {
                let position = topic.position(text.len());
                let prompt = format!(
                    "Write exactly one paragraph for a social media post: {}. \
Match the tone of this existing post:\n\n{}\n\nReturn only the new paragraph.",
                    topic.prompt_hint(),
                    text.serialize(),
                );
                let paragraph = self
                    .orchestrator
                    .generate_strict(self.prompts.editor_system(), &prompt, true, RecordKind::Edit)
                    .await?;
                let paragraph = first_paragraph(&paragraph).ok_or(RefineError::EmptyResult)?;
                Ok(text.insert(position, &paragraph)?.serialize())
            }
            EditIntent::WholeDocument => self.rewrite_document(&text, instruction).await,
        }
    }

    /// Rewrite one paragraph and splice it back; every other paragraph is
    /// carried over byte-identical by the paragraph model, not by asking
    /// the provider nicely.
    async fn rewrite_paragraph(
        &self,
        text: &ParagraphedText,
        index: usize,
        instruction: &str,
    ) -> Result<String, RefineError> {
        let target = text.get(index).ok_or(TextError::IndexOutOfRange {
            index,
            len: text.len(),
        })?;
        let prompt = format!(
            "Rewrite the following paragraph according to this instruction: {instruction}\n\n\
Paragraph:\n{target}\n\nReturn only the rewritten paragraph, nothing else.",
        );
        let rewritten = self
            .orchestrator
            .generate_strict(self.prompts.editor_system(), &prompt, true, RecordKind::Edit)
            .await?;
        let rewritten = first_paragraph(&rewritten).ok_or(RefineError::EmptyResult)?;
        Ok(text.replace(index, &rewritten)?.serialize())
    }

    async fn rewrite_document(
        &self,
        text: &ParagraphedText,
        instruction: &str,
    ) -> Result<String, RefineError> {
        let labeled: String = text
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{}) {}\n\n", i + 1, p))
            .collect();
        let prompt = format!(
            "Here is a post as numbered paragraphs:\n\n{labeled}\
Apply this instruction: {instruction}\n\n\
Return ALL paragraphs separated by blank lines, without the numbering. \
Change only what the instruction requires and copy every other paragraph verbatim.",
        );
        let rewritten = self
            .orchestrator
            .generate_strict(self.prompts.editor_system(), &prompt, true, RecordKind::Edit)
            .await?;

        let result = ParagraphedText::parse(&strip_numbering(&rewritten));
        if result.is_empty() {
            return Err(RefineError::EmptyResult);
        }
        if result.len() != text.len() {
            warn!(
                before = text.len(),
                after = result.len(),
                "paragraph count changed during whole-document edit"
            );
        }
        let prior_len = text.serialize().len();
        let new_len = result.serialize().len();
        if prior_len > 0 && (new_len * 4 < prior_len || new_len > prior_len * 4) {
            warn!(prior_len, new_len, "suspicious length delta after whole-document edit");
        }

        let serialized = result.serialize();
        // Keep decoration consistent with the source: if the prior text
        // carried no rich-text bold markers, strip any the rewrite added.
        if !text.serialize().contains("<b>") && serialized.contains("<b>") {
            return Ok(serialized.replace("<b>", "").replace("</b>", ""));
        }
        Ok(serialized)
    }

    fn resolve_deletion(
        &self,
        text: &ParagraphedText,
        target: &DeletionTarget,
    ) -> Option<Vec<usize>> {
        let indices = match target {
            DeletionTarget::Ordinal(n) => {
                if *n <= text.len() {
                    vec![*n]
                } else {
                    Vec::new()
                }
            }
            DeletionTarget::Fragments(fragments) => text.find_many_by_keywords(fragments),
        };
        if indices.is_empty() { None } else { Some(indices) }
    }
}

/// First non-empty paragraph of a provider reply; guards against replies
/// that wrap the paragraph in extra blank-line framing.
fn first_paragraph(reply: &str) -> Option<String> {
    ParagraphedText::parse(reply)
        .iter()
        .next()
        .map(str::to_string)
}

/// Remove "1)" / "2." ordinal labels a provider sometimes leaves in even
/// when told not to.
fn strip_numbering(reply: &str) -> String {
    reply
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            let stripped = trimmed
                .strip_prefix(|c: char| c.is_ascii_digit())
                .and_then(|rest| rest.strip_prefix(')').or_else(|| rest.strip_prefix('.')))
                .map(str::trim_start);
            stripped.unwrap_or(line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::provider::{
        ChannelRotator, CompletionRequest, ContentProvider, ProviderChannel,
    };
    use crate::store::Storage;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CannedProvider {
        replies: Mutex<Vec<Result<String, ProviderError>>>,
        calls: AtomicUsize,
    }

    impl CannedProvider {
        fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl ContentProvider for CannedProvider {
        async fn complete(
            &self,
            _request: &CompletionRequest,
            _channel: &ProviderChannel,
        ) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(ProviderError::Connection("script exhausted".into())))
        }
    }

    async fn engine_with(
        provider: Arc<CannedProvider>,
    ) -> (tempfile::TempDir, Arc<CannedProvider>, RefinementEngine) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::open(dir.path().join("p.db")).await.unwrap());
        let prompts = Arc::new(PromptLibrary::builtin());
        let rotator = Arc::new(ChannelRotator::new(vec!["k".into()], vec![]));
        let orchestrator = Arc::new(GenerationOrchestrator::new(
            provider.clone(),
            rotator,
            prompts.clone(),
            storage,
        ));
        let engine = RefinementEngine::new(orchestrator, prompts);
        (dir, provider, engine)
    }

    const PRIOR: &str = "A\n\nB\n\nC\n\nD";

    #[tokio::test]
    async fn deletion_by_ordinal_makes_no_provider_call() {
        let (_dir, provider, engine) = engine_with(Arc::new(CannedProvider::new(vec![]))).await;
        let result = engine
            .refine(PRIOR, "delete the 2nd paragraph")
            .await
            .unwrap();
        assert_eq!(result, "A\n\nC\n\nD");
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn deletion_by_fragment_makes_no_provider_call() {
        let prior = "Intro text.\n\nPricing details here.\n\nClosing words.";
        let (_dir, provider, engine) = engine_with(Arc::new(CannedProvider::new(vec![]))).await;
        let result = engine
            .refine(prior, r#"remove "pricing details""#)
            .await
            .unwrap();
        assert_eq!(result, "Intro text.\n\nClosing words.");
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn targeted_edit_changes_only_named_paragraph() {
        let (_dir, provider, engine) =
            engine_with(Arc::new(CannedProvider::new(vec![Ok("C short".into())]))).await;
        let result = engine
            .refine(PRIOR, "make paragraph 3 shorter")
            .await
            .unwrap();
        assert_eq!(result, "A\n\nB\n\nC short\n\nD");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn timeout_surfaces_not_fallback() {
        let (_dir, _provider, engine) = engine_with(Arc::new(CannedProvider::new(vec![
            Err(ProviderError::Timeout(60)),
            Err(ProviderError::Timeout(60)),
        ])))
        .await;
        let err = engine
            .refine(PRIOR, "make paragraph 3 shorter")
            .await
            .unwrap_err();
        assert!(matches!(err, RefineError::Timeout));
    }

    #[tokio::test]
    async fn insertion_places_greeting_first() {
        let (_dir, provider, engine) =
            engine_with(Arc::new(CannedProvider::new(vec![Ok("Hello everyone!".into())]))).await;
        let result = engine.refine(PRIOR, "add a greeting").await.unwrap();
        assert_eq!(result, "Hello everyone!\n\nA\n\nB\n\nC\n\nD");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn whole_document_edit_strips_numbering() {
        let reply = "1) A better\n\n2) B better\n\n3) C\n\n4) D";
        let (_dir, _provider, engine) =
            engine_with(Arc::new(CannedProvider::new(vec![Ok(reply.into())]))).await;
        let result = engine.refine(PRIOR, "make it friendlier").await.unwrap();
        assert_eq!(result, "A better\n\nB better\n\nC\n\nD");
    }

    #[tokio::test]
    async fn whole_document_edit_strips_foreign_bold_markers() {
        let reply = "<b>A</b>\n\nB\n\nC\n\nD";
        let (_dir, _provider, engine) =
            engine_with(Arc::new(CannedProvider::new(vec![Ok(reply.into())]))).await;
        let result = engine.refine(PRIOR, "polish the wording").await.unwrap();
        assert_eq!(result, "A\n\nB\n\nC\n\nD");
    }

    #[tokio::test]
    async fn out_of_range_ordinal_falls_back_to_whole_document() {
        let (_dir, provider, engine) =
            engine_with(Arc::new(CannedProvider::new(vec![Ok("A\n\nB".into())]))).await;
        let result = engine
            .refine("A\n\nB", "rewrite paragraph 4")
            .await
            .unwrap();
        assert_eq!(result, "A\n\nB");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn empty_rewrite_is_an_error() {
        let (_dir, _provider, engine) =
            engine_with(Arc::new(CannedProvider::new(vec![Ok("   ".into())]))).await;
        let err = engine
            .refine(PRIOR, "make it friendlier")
            .await
            .unwrap_err();
        assert!(matches!(err, RefineError::EmptyResult));
    }
}

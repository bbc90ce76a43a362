//! End-to-end question answering over an on-disk policy folder, with
//! in-process fakes standing in for the embedding and chat services.

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::StreamExt;
use tempfile::TempDir;

use hr_assistant::assistant::{AnswerKind, Assistant};
use hr_assistant::config::{parse_config, Config};
use hr_assistant::source_fs::FolderSource;
use hr_retrieval_core::embedding::Embedder;
use hr_retrieval_core::error::RetrieveError;
use hr_retrieval_core::generation::Generator;
use hr_retrieval_core::models::ChunkKind;

const LEAVE_MD: &str = "# Leave Policy\n\n\
Employees accrue casual leave and sick leave every month. Casual leave must be \
applied for two days in advance.\n\n\
| Leave Type | Days |\n\
|---|---|\n\
| Casual | 12 |\n\
| Sick | 10 |\n";

const WFH_TXT: &str = "Work from home requests need manager approval. \
Employees may work from home two days per week.";

const ETHICS_TXT: &str = "Workplace ethics require honesty and respect toward colleagues.";

/// Records prompts; answers paraphrase requests with JSON and everything
/// else with a fixed reply.
#[derive(Default)]
struct ScriptedGenerator {
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if prompt.contains("alternative phrasings") {
            return Ok("```json\n{\"phrasings\": [\"remote working rules\"]}\n```".to_string());
        }
        Ok("You get 12 casual leave days [leave.md, page 1].".to_string())
    }
}

/// Hashed bag-of-words vectors.
struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-64"
    }

    fn dims(&self) -> usize {
        64
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; 64];
                for token in t.split_whitespace() {
                    let mut h = DefaultHasher::new();
                    token.to_lowercase().hash(&mut h);
                    v[(h.finish() % 64) as usize] += 1.0;
                }
                v
            })
            .collect())
    }
}

struct DownEmbedder;

#[async_trait]
impl Embedder for DownEmbedder {
    fn model_name(&self) -> &str {
        "down"
    }

    fn dims(&self) -> usize {
        8
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("embedding service unavailable")
    }
}

fn policy_folder() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("leave.md"), LEAVE_MD).unwrap();
    fs::write(dir.path().join("wfh.txt"), WFH_TXT).unwrap();
    fs::create_dir_all(dir.path().join("conduct")).unwrap();
    fs::write(dir.path().join("conduct/ethics.txt"), ETHICS_TXT).unwrap();
    dir
}

fn config_for(folder: &Path, extra: &str) -> Config {
    let toml = format!("[documents]\nfolder = '{}'\n\n{}", folder.display(), extra);
    parse_config(&toml).unwrap()
}

fn assistant_with(
    config: &Config,
    embedder: Option<Arc<dyn Embedder>>,
) -> (Assistant, Arc<ScriptedGenerator>) {
    let generator = Arc::new(ScriptedGenerator::default());
    let source = Arc::new(FolderSource::new(&config.documents).unwrap());
    let assistant =
        Assistant::with_components(config, source, embedder, generator.clone()).unwrap();
    (assistant, generator)
}

#[tokio::test]
async fn test_rebuild_report() {
    let dir = policy_folder();
    let (assistant, _) = assistant_with(&config_for(dir.path(), ""), None);

    let report = assistant.rebuild().await.unwrap();
    assert_eq!(report.generation, 1);
    assert_eq!(report.documents, 3);
    assert!(report.failed_documents.is_empty());
    assert_eq!(report.table_chunks, 1);
    assert!(!report.semantic_enabled);
    assert_eq!(assistant.index().current().chunks().len(), report.chunks);
}

#[tokio::test]
async fn test_grounded_answer_puts_table_first() {
    let dir = policy_folder();
    let (assistant, generator) = assistant_with(&config_for(dir.path(), ""), None);
    assistant.rebuild().await.unwrap();

    let answer = assistant
        .ask("How many casual leave days do I get?", false)
        .await
        .unwrap();
    assert_eq!(answer.kind, AnswerKind::Grounded);
    assert!(answer.text.contains("12 casual leave days"));

    let context = answer.context.unwrap();
    assert_eq!(context.entries[0].kind, ChunkKind::Table);
    assert!(context.entries[0].content.contains("| Casual | 12 |"));

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("[RELEVANT TABLE DATA - leave.md, page 1]"));
    assert!(prompts[0].contains("Question: How many casual leave days do I get?"));
}

#[tokio::test]
async fn test_no_context_skips_generation() {
    let dir = policy_folder();
    let (assistant, generator) = assistant_with(&config_for(dir.path(), ""), None);
    assistant.rebuild().await.unwrap();

    let answer = assistant.ask("Quarterly bonus payout schedule?", false).await.unwrap();
    assert_eq!(answer.kind, AnswerKind::NoContext);
    assert!(answer.text.contains("not available in our company policy documents"));
    assert!(answer.context.is_none());
    assert!(generator.prompts().is_empty());
}

#[tokio::test]
async fn test_online_mode_skips_retrieval() {
    let dir = policy_folder();
    let (assistant, generator) = assistant_with(&config_for(dir.path(), ""), None);

    // No rebuild: online answers never touch the index.
    let answer = assistant.ask("What is an OKR?", true).await.unwrap();
    assert_eq!(answer.kind, AnswerKind::Open);
    assert!(answer.context.is_none());
    let prompts = generator.prompts();
    assert!(prompts[0].contains("Question: What is an OKR?"));
    assert!(!prompts[0].contains("RELEVANT"));
}

#[tokio::test]
async fn test_restricted_without_index_is_typed_error() {
    let dir = policy_folder();
    let (assistant, _) = assistant_with(&config_for(dir.path(), ""), None);

    let err = assistant.ask("casual leave", false).await.unwrap_err();
    assert!(err.downcast_ref::<RetrieveError>().is_some());
}

#[tokio::test]
async fn test_canned_answers_skip_everything() {
    let dir = policy_folder();
    let calendar = dir.path().join("holidays.txt");
    fs::write(&calendar, "## Holidays 2025\n| Date | Holiday |\n|---|---|\n| 26 Jan | Republic Day |").unwrap();
    let extra = format!("[assistant]\nname = 'AskHR'\nholiday_calendar = '{}'\n", calendar.display());
    let (assistant, generator) = assistant_with(&config_for(dir.path(), &extra), None);

    let hello = assistant.ask("Hello!", false).await.unwrap();
    assert_eq!(hello.kind, AnswerKind::Greeting);
    assert!(hello.text.contains("AskHR"));

    let who = assistant.ask("who are you?", false).await.unwrap();
    assert_eq!(who.kind, AnswerKind::Identity);

    let holidays = assistant.ask("Show me the holiday list", false).await.unwrap();
    assert_eq!(holidays.kind, AnswerKind::Holiday);
    assert!(holidays.text.contains("Republic Day"));

    assert!(generator.prompts().is_empty());
}

#[tokio::test]
async fn test_streaming_answer() {
    let dir = policy_folder();
    let (assistant, _) = assistant_with(&config_for(dir.path(), ""), None);
    assistant.rebuild().await.unwrap();

    let answer = assistant.ask_streaming("casual leave days", false).await.unwrap();
    assert_eq!(answer.kind, AnswerKind::Grounded);
    let text: Vec<String> = answer.text.map(|d| d.unwrap()).collect().await;
    assert_eq!(text.concat(), "You get 12 casual leave days [leave.md, page 1].");
}

#[tokio::test]
async fn test_acronym_expansion_reaches_retrieval() {
    let dir = policy_folder();
    let (assistant, _) = assistant_with(&config_for(dir.path(), ""), None);
    assistant.rebuild().await.unwrap();

    let report = assistant.search("WFH approval?").await.unwrap();
    assert_eq!(report.expanded_question, "work from home policy approval?");
    let context = report.context.unwrap();
    assert_eq!(context.entries[0].provenance.as_ref().unwrap().source_document, "wfh.txt");
}

#[tokio::test]
async fn test_custom_acronyms_replace_defaults() {
    let dir = policy_folder();
    let extra = "[query.acronyms]\nwe = \"workplace ethics\"\n";
    let (assistant, _) = assistant_with(&config_for(dir.path(), extra), None);
    assistant.rebuild().await.unwrap();

    let report = assistant.search("we rules").await.unwrap();
    assert_eq!(report.expanded_question, "workplace ethics rules");
    let wfh = assistant.search("wfh").await.unwrap();
    assert_eq!(wfh.expanded_question, "wfh");
}

#[tokio::test]
async fn test_paraphrase_expansion() {
    let dir = policy_folder();
    let (assistant, generator) =
        assistant_with(&config_for(dir.path(), "[query]\nllm_expansion = true\n"), None);
    assistant.rebuild().await.unwrap();

    let report = assistant.search("wfh").await.unwrap();
    assert!(report.expanded_question.starts_with("work from home policy"));
    assert!(report.expanded_question.contains("remote working rules"));
    assert_eq!(generator.prompts().len(), 1);
}

#[tokio::test]
async fn test_semantic_index_populated_and_queried() {
    let dir = policy_folder();
    let extra = "[retrieval]\ninsert_batch_size = 2\n";
    let (assistant, _) = assistant_with(&config_for(dir.path(), extra), Some(Arc::new(HashEmbedder)));

    let report = assistant.rebuild().await.unwrap();
    assert!(report.semantic_enabled);
    assert_eq!(report.semantic_records, report.chunks);
    assert_eq!(report.failed_batches, 0);

    let search = assistant.search("casual leave").await.unwrap();
    let context = search.context.unwrap();
    assert!(!context.degraded);
    // Both indices return the leave chunks; fingerprints keep one copy each.
    let mut prefixes: Vec<String> = context.entries.iter().map(|e| e.content.chars().take(100).collect()).collect();
    let before = prefixes.len();
    prefixes.sort();
    prefixes.dedup();
    assert_eq!(prefixes.len(), before);
}

#[tokio::test]
async fn test_semantic_outage_degrades_to_keywords() {
    let dir = policy_folder();
    let (assistant, _) = assistant_with(&config_for(dir.path(), ""), Some(Arc::new(DownEmbedder)));

    let report = assistant.rebuild().await.unwrap();
    assert_eq!(report.semantic_records, 0);
    assert!(report.failed_batches > 0);

    let search = assistant.search("casual leave").await.unwrap();
    assert!(search.context.unwrap().degraded);
}

#[tokio::test]
async fn test_failed_rebuild_keeps_serving_previous_index() {
    let dir = policy_folder();
    let (assistant, _) = assistant_with(&config_for(dir.path(), ""), None);
    assistant.rebuild().await.unwrap();

    for name in ["leave.md", "wfh.txt", "conduct/ethics.txt"] {
        fs::remove_file(dir.path().join(name)).unwrap();
    }
    assert!(assistant.rebuild().await.is_err());

    assert_eq!(assistant.index().current().generation(), 1);
    let report = assistant.search("casual leave").await.unwrap();
    assert!(report.context.is_some());
}

#[tokio::test]
async fn test_rebuild_picks_up_new_documents() {
    let dir = policy_folder();
    let (assistant, _) = assistant_with(&config_for(dir.path(), ""), None);
    assistant.rebuild().await.unwrap();
    assert!(assistant.search("relocation allowance").await.unwrap().no_context_found);

    fs::write(
        dir.path().join("relocation.md"),
        "Relocation allowance covers travel and two weeks of housing.",
    )
    .unwrap();
    let report = assistant.rebuild().await.unwrap();
    assert_eq!(report.generation, 2);
    assert_eq!(report.documents, 4);

    let search = assistant.search("relocation allowance").await.unwrap();
    assert_eq!(search.generation, 2);
    assert!(search.rendered.unwrap().contains("[RELEVANT CONTEXT - relocation.md, page 1]"));
}

#[tokio::test]
async fn test_broken_document_is_skipped() {
    let dir = policy_folder();
    fs::write(dir.path().join("scan.pdf"), b"not really a pdf").unwrap();
    let (assistant, _) = assistant_with(&config_for(dir.path(), ""), None);

    let report = assistant.rebuild().await.unwrap();
    assert_eq!(report.failed_documents, vec!["scan.pdf".to_string()]);
    assert_eq!(report.documents, 4);
}

#[tokio::test]
async fn test_empty_question_rejected() {
    let dir = policy_folder();
    let (assistant, _) = assistant_with(&config_for(dir.path(), ""), None);
    assert!(assistant.ask("   ", true).await.is_err());
    assert!(assistant.search("").await.is_err());
}

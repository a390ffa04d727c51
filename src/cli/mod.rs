//! CLI 모듈
//!
//! lender-criteria-rag CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::collector::{CollectionStats, FileCollector};
use crate::config::AppConfig;
use crate::ingest::{self, IngestOptions};
use crate::knowledge::{ScoredChunk, VectorStore};
use crate::llm::ChatMessage;
use crate::rag::{render_answer, CriteriaAssistant, QueryOutcome, DEFAULT_SECTION};
use crate::server;
use crate::services;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "lender-criteria-rag")]
#[command(version, about = "UK mortgage lender criteria search and Q&A", long_about = None)]
pub struct Cli {
    /// 설정 파일 경로 (기본: <data_dir>/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 심사기준 파일 또는 폴더를 색인
    Ingest {
        /// 수집할 파일 경로
        #[arg(long)]
        file: Option<PathBuf>,

        /// 수집할 폴더 경로 (재귀)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// 파일명 대신 사용할 대출기관 이름
        #[arg(short, long)]
        lender: Option<String>,

        /// 변경이 없어도 다시 수집
        #[arg(long)]
        force: bool,
    },

    /// 심사기준 검색 (답변 생성 없음)
    Search {
        query: String,

        /// 대출기관 필터 (정확히 일치)
        #[arg(short, long)]
        lender: Option<String>,

        /// 결과 개수 (기본: retrieval.top_k)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// 질문 하나에 답변
    Ask {
        query: String,

        #[arg(short, long)]
        lender: Option<String>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// 대화형 채팅
    Chat {
        #[arg(short, long)]
        lender: Option<String>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// 대출기관 목록 (카탈로그 + 색인)
    Lenders,

    /// 상태 확인
    Status,

    /// 색인된 파일 삭제
    Delete {
        /// 삭제할 파일명 (예: barclays_residential.txt)
        #[arg(long)]
        file: String,
    },

    /// HTTP 백엔드 실행
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Ingest {
            file,
            dir,
            lender,
            force,
        } => cmd_ingest(&config, file, dir, lender, force).await,
        Commands::Search {
            query,
            lender,
            limit,
        } => cmd_search(&config, &query, lender, limit).await,
        Commands::Ask {
            query,
            lender,
            limit,
        } => cmd_ask(&config, &query, lender, limit).await,
        Commands::Chat { lender, limit } => cmd_chat(&config, lender, limit).await,
        Commands::Lenders => cmd_lenders(&config).await,
        Commands::Status => cmd_status(&config).await,
        Commands::Delete { file } => cmd_delete(&config, &file).await,
        Commands::Serve { host, port } => cmd_serve(config, host, port).await,
    }
}

/// 질의 명령어용 assistant 조립
async fn open_assistant(config: &AppConfig) -> Result<CriteriaAssistant> {
    let (embedder, chat) = services::openai_providers(config)?;
    let store = services::open_vector_store(config).await?;
    Ok(services::build_assistant(config, embedder, chat, store))
}

/// 빈 문자열 필터는 "전체"
fn normalize_filter(lender: Option<String>) -> Option<String> {
    lender
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 수집 명령어 (ingest)
async fn cmd_ingest(
    config: &AppConfig,
    file: Option<PathBuf>,
    dir: Option<PathBuf>,
    lender: Option<String>,
    force: bool,
) -> Result<()> {
    let path = match (file, dir) {
        (Some(file), None) => file,
        (None, Some(dir)) => dir,
        (Some(_), Some(_)) => bail!("Specify only one of --file or --dir"),
        (None, None) => bail!("Specify --file or --dir"),
    };

    let (embedder, _) = services::openai_providers(config)?;
    let store = services::open_vector_store(config).await?;
    let registry = services::open_registry(config)?;
    let pipeline = services::build_ingest_pipeline(config, embedder, store, registry.clone());

    if path.is_dir() {
        print_collection_preview(&path)?;
    }

    println!("[*] Ingesting {}...", path.display());

    let options = IngestOptions {
        lender_override: normalize_filter(lender),
        force,
    };
    let report = pipeline.ingest_path(&path, &options).await?;

    println!();
    println!(
        "[OK] Done: {} ingested, {} unchanged, {} failed ({} chunks)",
        report.processed, report.skipped, report.failed, report.chunks
    );
    for (filename, error) in &report.failures {
        println!("[!] {}: {}", filename, error);
    }

    match services::update_catalog_totals(config, &registry) {
        Ok(Some(catalog)) => {
            if let Some(files) = &catalog.lender_files_config {
                println!(
                    "[OK] Catalog updated: {} files, updated {}",
                    files.total_files.unwrap_or(0),
                    files.last_updated.as_deref().unwrap_or("-")
                );
            }
        }
        Ok(None) => {}
        Err(e) => println!("[!] Failed to update lender catalog: {:#}", e),
    }

    Ok(())
}

fn print_collection_preview(dir: &Path) -> Result<()> {
    let files = FileCollector::with_defaults().collect_directory(dir)?;
    let stats = CollectionStats::from_files(&files);

    println!("[*] Found {} files", stats.total_files);
    println!("    Text: {}, PDF: {}", stats.text_files, stats.pdf_files);
    println!("    Total size: {}", format_bytes(stats.total_size as usize));
    println!();
    Ok(())
}

/// 검색 명령어 (search)
async fn cmd_search(
    config: &AppConfig,
    query: &str,
    lender: Option<String>,
    limit: Option<usize>,
) -> Result<()> {
    let assistant = open_assistant(config).await?;
    let lender = normalize_filter(lender);
    let top_k = limit.unwrap_or(config.retrieval.top_k);

    println!("[*] Searching: \"{}\"", query);

    let results = assistant
        .search(query, top_k, lender.as_deref())
        .await
        .context("Search failed")?;

    if results.is_empty() {
        println!("\n[!] No results.");
        return Ok(());
    }

    println!("\n[OK] {} results:\n", results.len());
    for (i, result) in results.iter().enumerate() {
        print_result(i + 1, result);
    }

    Ok(())
}

fn print_result(rank: usize, result: &ScoredChunk) {
    let metadata = &result.record.metadata;

    println!(
        "{}. [score: {:.4}] {} | {}",
        rank,
        result.score,
        metadata.lender_name,
        metadata.criteria_section.as_deref().unwrap_or(DEFAULT_SECTION)
    );

    match &metadata.page_numbers {
        Some(pages) if !pages.is_empty() => {
            let pages: Vec<String> = pages.iter().map(|p| p.to_string()).collect();
            println!("   File: {} (page {})", metadata.filename, pages.join(", "));
        }
        _ => println!("   File: {}", metadata.filename),
    }

    println!("   {}", truncate_text(&result.record.text, 200));
    println!();
}

/// 단일 질문 명령어 (ask)
async fn cmd_ask(
    config: &AppConfig,
    query: &str,
    lender: Option<String>,
    limit: Option<usize>,
) -> Result<()> {
    let assistant = open_assistant(config).await?;
    let lender = normalize_filter(lender);
    let top_k = limit.unwrap_or(config.retrieval.top_k);

    let outcome = assistant
        .answer_query(&[], query, lender.as_deref(), top_k)
        .await;

    print_outcome(&outcome);
    Ok(())
}

fn print_outcome(outcome: &QueryOutcome) {
    if let Some(ref diagnostic) = outcome.diagnostic {
        println!("[!] Search failed: {}", diagnostic);
    }

    println!();
    println!("{}", render_answer(&outcome.answer));

    if !outcome.results.is_empty() {
        println!();
        println!("[*] Sources ({}):", outcome.results.len());
        for result in &outcome.results {
            println!(
                "    - {} | {} ({:.3})",
                result.lender_name(),
                result
                    .record
                    .metadata
                    .criteria_section
                    .as_deref()
                    .unwrap_or(DEFAULT_SECTION),
                result.score
            );
        }
    }
    println!();
}

/// 대화형 채팅 명령어 (chat)
///
/// - `lender:NAME` 필터 설정, `lender:` 필터 해제
/// - `stats` 색인 통계
/// - `clear` 대화 초기화
/// - `quit` / `exit` 종료
async fn cmd_chat(config: &AppConfig, lender: Option<String>, limit: Option<usize>) -> Result<()> {
    let assistant = open_assistant(config).await?;
    let top_k = limit.unwrap_or(config.retrieval.top_k);
    let mut lender = normalize_filter(lender);
    let mut conversation: Vec<ChatMessage> = Vec::new();

    println!("Mortgage criteria chat. Commands: lender:NAME, lender:, stats, clear, quit");
    if let Some(ref name) = lender {
        println!("[*] Lender filter: {}", name);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"\n> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        if input.is_empty() {
            continue;
        }

        match input {
            "quit" | "exit" => break,
            "clear" => {
                conversation.clear();
                println!("[OK] Conversation cleared");
                continue;
            }
            "stats" => {
                print_store_stats(assistant.retriever().store().as_ref()).await;
                continue;
            }
            _ => {}
        }

        if let Some(name) = input.strip_prefix("lender:") {
            lender = normalize_filter(Some(name.to_string()));
            match lender {
                Some(ref name) => println!("[OK] Lender filter: {}", name),
                None => println!("[OK] Lender filter cleared"),
            }
            continue;
        }

        conversation.push(ChatMessage::user(input));

        let outcome = assistant
            .answer_query(&conversation, input, lender.as_deref(), top_k)
            .await;
        print_outcome(&outcome);

        conversation.push(ChatMessage::assistant(render_answer(&outcome.answer)));
    }

    Ok(())
}

async fn print_store_stats(store: &dyn VectorStore) {
    match store.count().await {
        Ok(count) => println!("[OK] Indexed chunks: {}", count),
        Err(e) => println!("[!] Failed to count chunks: {:#}", e),
    }
    match store.lender_names().await {
        Ok(names) => println!("[OK] Indexed lenders: {}", names.len()),
        Err(e) => println!("[!] Failed to list lenders: {:#}", e),
    }
}

/// 대출기관 목록 명령어 (lenders)
async fn cmd_lenders(config: &AppConfig) -> Result<()> {
    let normalizer = config.normalizer();

    match services::load_catalog(config)? {
        Some(catalog) => {
            println!("[OK] Lender catalog ({} lenders):", catalog.total_lenders());
            for (category, identifiers) in &catalog.lender_categories {
                println!();
                println!("  {}", category);
                for identifier in identifiers {
                    println!("    - {}", normalizer.normalize(identifier));
                }
            }
        }
        None => println!(
            "[!] No lender catalog at {}",
            config.catalog_path().display()
        ),
    }

    let store = services::open_vector_store(config).await?;
    let indexed = store.lender_names().await?;

    println!();
    if indexed.is_empty() {
        println!("[!] No lenders indexed yet. Run `ingest --dir <path>` first.");
    } else {
        println!("[OK] Indexed lenders ({}):", indexed.len());
        for name in indexed {
            println!("    - {}", name);
        }
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: &AppConfig) -> Result<()> {
    println!("lender-criteria-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] Data directory: {}", config.data_dir.display());

    if config.openai.has_api_key() {
        println!("[OK] API key: configured");
    } else {
        println!("[!] API key: missing");
        println!("    Set OPENAI_API_KEY (or add it to .env)");
    }
    println!(
        "[*] Models: {} (embedding), {} (chat)",
        config.openai.embedding_model, config.openai.chat_model
    );

    match services::open_registry(config).and_then(|r| r.stats()) {
        Ok(stats) => {
            println!(
                "[OK] Ingested files: {} ({} lenders, {} chunks)",
                stats.file_count, stats.lender_count, stats.chunk_count
            );
            if let Some(at) = stats.last_ingested_at {
                println!("     Last ingest: {}", at.format("%Y-%m-%d %H:%M"));
            }
        }
        Err(e) => println!("[!] Failed to read ingest registry: {:#}", e),
    }

    match services::open_vector_store(config).await {
        Ok(store) => match store.count().await {
            Ok(count) => println!("[OK] Vector index: {} chunks", count),
            Err(e) => println!("[!] Failed to count chunks: {:#}", e),
        },
        Err(e) => println!("[!] Vector store unavailable: {:#}", e),
    }

    Ok(())
}

/// 삭제 명령어 (delete)
async fn cmd_delete(config: &AppConfig, filename: &str) -> Result<()> {
    let store = services::open_vector_store(config).await?;
    let registry = services::open_registry(config)?;

    let removed = ingest::remove_file(store.as_ref(), &registry, filename).await?;

    if removed > 0 {
        println!("[OK] Deleted {} chunks of {}", removed, filename);
    } else {
        println!("[!] No chunks found for {}", filename);
    }

    if let Err(e) = services::update_catalog_totals(config, &registry) {
        println!("[!] Failed to update lender catalog: {:#}", e);
    }

    Ok(())
}

/// 서버 명령어 (serve)
async fn cmd_serve(mut config: AppConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    println!(
        "[*] Starting backend on http://{}:{}",
        config.server.host, config.server.port
    );
    server::serve(&config).await
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("LTV 95%", 10), "LTV 95%");
        assert_eq!(truncate_text("maximum age 75", 7), "maximum...");
        assert_eq!(truncate_text("Age Limits\nMax 75", 40), "Age Limits Max 75");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_truncate_unicode() {
        assert_eq!(truncate_text("£25,000 최소 소득", 7), "£25,000...");
    }

    #[test]
    fn test_normalize_filter() {
        assert_eq!(normalize_filter(Some(" Barclays ".to_string())), Some("Barclays".to_string()));
        assert_eq!(normalize_filter(Some("  ".to_string())), None);
        assert_eq!(normalize_filter(None), None);
    }

    #[test]
    fn test_cli_parses_commands() {
        let cli = Cli::try_parse_from([
            "lender-criteria-rag",
            "ingest",
            "--dir",
            "criteria",
            "--lender",
            "HSBC",
            "--force",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Ingest { dir: Some(_), lender: Some(_), force: true, .. }
        ));

        let cli = Cli::try_parse_from([
            "lender-criteria-rag",
            "--config",
            "custom.toml",
            "search",
            "LTV limits",
            "--lender",
            "Barclays",
            "--limit",
            "5",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert!(matches!(cli.command, Commands::Search { limit: Some(5), .. }));

        let cli = Cli::try_parse_from(["lender-criteria-rag", "serve", "--port", "9000"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve { port: Some(9000), host: None }));

        assert!(Cli::try_parse_from(["lender-criteria-rag", "delete"]).is_err());
    }
}

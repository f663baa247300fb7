use std::sync::Arc;

use recruit_assist::config::{AppConfig, ClassifierStrategy};
use recruit_assist::crm::{RestCandidateSource, sync_candidates};
use recruit_assist::llm::create_provider;
use recruit_assist::mail::{GmailMailbox, MailQuery, TimeRange};
use recruit_assist::pipeline::classifier::{Classifier, KeywordClassifier, LlmClassifier};
use recruit_assist::pipeline::router::Router;
use recruit_assist::pipeline::templates::TemplateSet;
use recruit_assist::pipeline::{EmailProcessor, RunSummary};
use recruit_assist::store::{LibSqlStore, RecordStore};
use secrecy::ExposeSecret;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Log to both console and a file, like the cron logs this runs under.
    let log_dir =
        std::env::var("RECRUIT_ASSIST_LOG_DIR").unwrap_or_else(|_| "./logs".to_string());
    let file_appender = tracing_appender::rolling::daily(&log_dir, "recruit-assist.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    // The only positional argument is the time range. Default: today.
    let range = match std::env::args().nth(1) {
        Some(arg) => TimeRange::parse(&arg).unwrap_or_else(|| {
            eprintln!("Error: unknown time range '{arg}'");
            eprintln!("  usage: recruit-assist [today|yesterday|last_week]");
            std::process::exit(1);
        }),
        None => TimeRange::Today,
    };

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    eprintln!("📬 Recruit Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Range: {}", range.label());
    eprintln!("   Database: {}", config.db_path.display());

    // ── Store ────────────────────────────────────────────────────────
    let store: Arc<LibSqlStore> = Arc::new(
        LibSqlStore::new_local(&config.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: failed to open database at {}: {e}",
                    config.db_path.display()
                );
                std::process::exit(1);
            }),
    );

    // Tallies are rebuilt from records once per run, before processing,
    // which closes any record-written/tally-missed gap from a crash.
    store.rebuild_tallies().await.unwrap_or_else(|e| {
        eprintln!("Error: failed to rebuild tallies: {e}");
        std::process::exit(1);
    });

    // ── Completion service ───────────────────────────────────────────
    let completions = match config.completions {
        Some(ref completion_config) => {
            let provider = create_provider(completion_config).unwrap_or_else(|e| {
                eprintln!("Error: failed to create completion provider: {e}");
                std::process::exit(1);
            });
            eprintln!("   Completions: {}", provider.model_name());
            Some(provider)
        }
        None => {
            eprintln!("   Completions: disabled (no OPENAI_API_KEY)");
            None
        }
    };

    let classifier: Arc<dyn Classifier> = match config.strategy {
        ClassifierStrategy::Delegated => {
            // from_env rejects Delegated without a completion service.
            let provider = completions.clone().ok_or("completion service missing")?;
            Arc::new(LlmClassifier::new(provider))
        }
        ClassifierStrategy::Rules => {
            Arc::new(KeywordClassifier::default_rules(config.match_mode))
        }
    };
    eprintln!("   Classifier: {}", classifier.name());

    let templates = if completions.is_some() {
        TemplateSet::defaults()
    } else {
        tracing::warn!("No completion service configured, reply drafts are disabled");
        TemplateSet::empty()
    };

    // ── Roster ───────────────────────────────────────────────────────
    if let Some(ref account) = config.bootstrap {
        store
            .upsert_candidate(
                &account.address,
                &account.address,
                None,
                Some(account.access_token.expose_secret()),
            )
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: failed to store bootstrap account: {e}");
                std::process::exit(1);
            });
        eprintln!("   Account: {}", account.address);
    }

    // One timed client for every remote collaborator, CRM sync included.
    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()?;

    if let Some(ref crm) = config.crm {
        eprintln!("   CRM sync: {} (limit {})", crm.base_url, crm.sync_limit);
        let source = RestCandidateSource::new(&crm.base_url, crm.api_token.clone())
            .with_client(http.clone());
        // Sync failure is not fatal; the roster already in the database
        // still gets processed.
        if let Err(e) = sync_candidates(&source, store.as_ref(), crm.sync_limit).await {
            tracing::warn!(error = %e, "CRM sync failed, continuing with stored roster");
        }
    }

    let candidates = store.list_candidates().await.unwrap_or_else(|e| {
        eprintln!("Error: failed to list candidates: {e}");
        std::process::exit(1);
    });

    let with_tokens = candidates
        .iter()
        .filter(|c| c.access_token.is_some())
        .count();
    if with_tokens == 0 {
        eprintln!("Error: no candidate has a mailbox access token; nothing to process");
        eprintln!("  set GMAIL_ADDRESS and GMAIL_ACCESS_TOKEN, or sync tokens via the CRM");
        std::process::exit(1);
    }
    eprintln!("   Accounts: {with_tokens} of {}\n", candidates.len());

    // ── Batch run ────────────────────────────────────────────────────
    let query = MailQuery {
        range,
        unread_only: config.unread_only,
    };

    let mut run = RunSummary::default();
    for candidate in &candidates {
        let Some(ref token) = candidate.access_token else {
            tracing::warn!(account = %candidate.email, "No access token on file, skipping");
            continue;
        };

        let mailbox = Arc::new(
            GmailMailbox::new(&candidate.email, token.clone()).with_client(http.clone()),
        );
        let router = Router::new(mailbox.clone(), completions.clone(), templates.clone())
            .with_move_semantics(config.remove_from_inbox);
        let mut processor =
            EmailProcessor::new(mailbox, classifier.clone(), router, store.clone());

        let summary = processor.process_account(candidate, &query).await;
        run.absorb(&summary);
    }

    tracing::info!(
        accounts = run.accounts,
        processed = run.processed,
        skipped = run.skipped_duplicates,
        label_failures = run.label_failures,
        drafts = run.drafts_created,
        failed = run.failed,
        categories = %run.categories_label(),
        "Run complete"
    );

    // Individual email failures never change the exit status.
    Ok(())
}

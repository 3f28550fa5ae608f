//! Catalyst command implementations

use anyhow::{Context, Result};
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use catalyst_agent::{describe_failure, LoopSettings, Runner, RunnerConfig};
use catalyst_config::{self, Config};
use catalyst_mcp::ServerParams;
use catalyst_provider::OpenAiCompatProvider;
use catalyst_session::{Role, SessionManager};

const FOOTNOTE_KEYWORDS: &[&str] = &["ppt", "presentation", "slides"];

const FOOTNOTE: &str = "Footnote: If you wish to generate a PowerPoint presentation using the text above, please click the PPT icon.";

/// Whether `prompt` asks for slide material
pub fn wants_presentation(prompt: &str) -> bool {
    let lower = prompt.to_lowercase();
    FOOTNOTE_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Launch parameters for the configured tool provider
pub fn server_params(config: &Config) -> ServerParams {
    let tool_server = &config.tool_server;
    let mut params =
        ServerParams::new(tool_server.command.clone()).with_args(tool_server.args.clone());

    if let Some(script) = config.script_path() {
        params = params.with_script(script);
    }
    if let Some(dir) = &tool_server.working_dir {
        params = params.with_working_dir(catalyst_config::paths::expand_home(dir));
    }
    for (key, value) in &tool_server.env {
        params = params.with_env(key.clone(), value.clone());
    }
    params
}

fn runner(config: &Config) -> Runner<OpenAiCompatProvider> {
    let provider = OpenAiCompatProvider::new(
        config.api_key().unwrap_or_default(),
        Some(config.api_base()),
        Some(config.model()),
    );

    let settings = LoopSettings {
        model: config.model(),
        max_tokens: config.llm.max_tokens,
        temperature: config.llm.temperature,
        max_iterations: config.agent.max_iterations,
        system_prompt: config.agent.system_prompt.clone(),
    };

    Runner::new(
        Arc::new(provider),
        RunnerConfig {
            server: server_params(config),
            handshake_timeout: config.handshake_timeout(),
            settings,
        },
    )
}

/// Write the default config
pub async fn init_command() -> Result<()> {
    println!("◆ Initializing Catalyst Assist...");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = catalyst_config::init()
        .await
        .context("Failed to write default config")?;

    println!("Config:   {}", catalyst_config::config_path().display());
    println!("Sessions: {}", catalyst_config::sessions_dir().display());

    println!("\n◆ Catalyst Assist initialized");
    println!("\nNext steps:");
    println!(
        "  1. Set {} (or add it to ~/.catalyst/config.json)",
        config.llm.provider.key_var()
    );
    println!("  2. Place the tool provider script next to where you run catalyst");
    println!("  3. Start chatting: catalyst chat -m \"How many devices are there?\"");

    Ok(())
}

/// One-shot question or interactive chat
pub async fn chat_command(message: Option<String>, session_key: String) -> Result<()> {
    let config = Config::load().await.context("Failed to load config")?;

    if !config.has_api_key() {
        anyhow::bail!(
            "No API key configured. Set {} or add it to ~/.catalyst/config.json",
            config.llm.provider.key_var()
        );
    }

    let runner = runner(&config);
    let mut sessions = SessionManager::with_max_messages(
        catalyst_config::sessions_dir(),
        config.session_max_messages(),
    );

    let mut interrupts = spawn_interrupt_listener();

    if let Some(msg) = message {
        let answer = ask(
            &runner,
            &mut sessions,
            &config,
            &session_key,
            &msg,
            &mut interrupts,
        )
        .await?;
        print_answer(&msg, &answer);
        return Ok(());
    }

    println!("◆ Catalyst Assist (type 'exit' to quit)");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    {
        let session = sessions.get_or_create(&session_key).await;
        for entry in &session.messages {
            match entry.role {
                Role::User => println!("◆ {}", entry.content),
                Role::Assistant => println!("{}\n", entry.content),
            }
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("◆ ");
        std::io::stdout().flush()?;

        let Some(line) = read_prompt(&mut lines, &mut interrupts).await? else {
            println!();
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        let answer = ask(
            &runner,
            &mut sessions,
            &config,
            &session_key,
            input,
            &mut interrupts,
        )
        .await?;
        print_answer(input, &answer);
    }

    Ok(())
}

/// Forward every Ctrl-C for the lifetime of the command
fn spawn_interrupt_listener() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

/// Next input line, or `None` on end of input or an interrupt while idle
async fn read_prompt<R>(
    lines: &mut Lines<R>,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    tokio::select! {
        line = lines.next_line() => Ok(line?),
        Some(()) = interrupts.recv() => {
            debug!("◆ INTERRUPT AT PROMPT");
            Ok(None)
        }
    }
}

/// Drive `turn` to completion, cancelling it on interrupt
async fn interruptible<F, T>(
    turn: F,
    cancel: &CancellationToken,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
) -> T
where
    F: Future<Output = T>,
{
    tokio::pin!(turn);
    let result = loop {
        tokio::select! {
            result = &mut turn => break result,
            Some(()) = interrupts.recv(), if !cancel.is_cancelled() => {
                debug!("◆ INTERRUPT RECEIVED");
                cancel.cancel();
            }
        }
    };

    // presses that raced the end of the turn must not end the next prompt
    while interrupts.try_recv().is_ok() {}
    result
}

/// Run one turn and record it in the session
async fn ask(
    runner: &Runner<OpenAiCompatProvider>,
    sessions: &mut SessionManager,
    config: &Config,
    session_key: &str,
    prompt: &str,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
) -> Result<String> {
    let history = if config.agent.carry_history {
        sessions
            .get_or_create(session_key)
            .await
            .get_history(config.agent.history_messages)
    } else {
        Vec::new()
    };

    let cancel = CancellationToken::new();
    let outcome = interruptible(
        runner.run(history, prompt, cancel.clone()),
        &cancel,
        interrupts,
    )
    .await;

    let session = sessions.get_or_create(session_key).await;
    session.add_user(prompt);
    let answer = match outcome {
        Ok(answer) => {
            session.add_assistant(answer.clone());
            answer
        }
        Err(e) => {
            error!("◆ RUN FAILED: {}", e);
            let text = describe_failure(&e);
            session.add_failure(text.clone());
            text
        }
    };
    let snapshot = session.clone();
    if let Err(e) = sessions.save(&snapshot).await {
        warn!("◆ FAILED TO SAVE SESSION {}: {}", session_key, e);
    }

    Ok(answer)
}

fn print_answer(prompt: &str, answer: &str) {
    println!("\n{}\n", answer);
    if wants_presentation(prompt) {
        println!("---");
        println!("{}\n", FOOTNOTE);
    }
}

/// List the provider's tools
pub async fn tools_command() -> Result<()> {
    let config = Config::load().await.context("Failed to load config")?;
    let runner = runner(&config);

    let tools = match runner.list_tools().await {
        Ok(tools) => tools,
        Err(e) => anyhow::bail!(describe_failure(&e)),
    };

    println!("◆ {} tools available", tools.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for tool in tools {
        if tool.description.is_empty() {
            println!("  {}", tool.name);
        } else {
            println!("  {} - {}", tool.name, tool.description);
        }
    }

    Ok(())
}

/// Show resolved configuration
pub async fn status_command() -> Result<()> {
    let config_path = catalyst_config::config_path();
    let config = Config::load().await.context("Failed to load config")?;

    println!("◆ Catalyst Assist Status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!(
        "Config:    {} {}",
        config_path.display(),
        if config_path.exists() { "[OK]" } else { "[Missing]" }
    );
    println!("Provider:  {:?}", config.llm.provider);
    println!("Model:     {}", config.model());
    println!("API base:  {}", config.api_base());
    println!(
        "API Key:   {}",
        if config.has_api_key() { "[Set]" } else { "[Missing]" }
    );
    println!("Command:   {}", config.tool_server.command);
    match config.script_path() {
        Some(script) => println!(
            "Script:    {} {}",
            script.display(),
            if script.exists() { "[OK]" } else { "[Missing]" }
        ),
        None => println!("Script:    [None]"),
    }
    println!("Max steps: {}", config.agent.max_iterations);
    println!("Session max: {} messages", config.session_max_messages());

    println!("\n◆ Ready");

    Ok(())
}

//! services/client/src/cli.rs
//!
//! The `lexilearn` command line: argument parsing and one handler per command.
//!
//! Every command names the page it stands for, and the route guard is asked
//! before anything is sent. All prompts and output go through the reader and
//! writer handed in, so the whole flow can be driven from tests.

use clap::{Parser, Subcommand};
use lexilearn_core::{
    Access, AuthService, CardCollection, CardFields, CardId, CollectionError, DeckCollection,
    DeckId, HintSlot, Route, StudyError, StudySession, StudyState,
};
use std::io::{self, Write};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use crate::error::ClientError;
use crate::state::AppState;

//=========================================================================================
// Arguments
//=========================================================================================

#[derive(Parser, Debug)]
#[command(name = "lexilearn")]
#[command(
    author,
    version,
    about = "Study LexiLearn flashcards from the terminal",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in and remember the session
    Login {
        email: String,
        /// Password. When omitted it is read from stdin, which echoes it on a terminal.
        #[arg(long, env = "LEXILEARN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create an account
    Signup {
        email: String,
        /// Password. When omitted it is read from stdin, which echoes it on a terminal.
        #[arg(long, env = "LEXILEARN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show whether a session is stored
    Whoami,
    /// Manage decks
    #[command(subcommand)]
    Decks(DeckCommands),
    /// Manage the cards of one deck
    #[command(subcommand)]
    Cards(CardCommands),
    /// Review the due cards of a deck
    Study { deck: i64 },
}

#[derive(Subcommand, Debug)]
pub enum DeckCommands {
    List,
    Create { name: String },
    /// Re-read one deck from the server
    Show { deck: i64 },
    Rename { deck: i64, name: String },
    Delete {
        deck: i64,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum CardCommands {
    List { deck: i64 },
    Add { deck: i64, question: String, answer: String },
    Edit { deck: i64, card: i64, question: String, answer: String },
    Delete {
        deck: i64,
        card: i64,
        #[arg(short, long)]
        yes: bool,
    },
}

impl Commands {
    /// The page this command corresponds to, if it is guarded at all.
    pub fn route(&self) -> Option<Route> {
        match self {
            Commands::Login { .. } => Some(Route::Login),
            Commands::Signup { .. } => Some(Route::Signup),
            Commands::Logout | Commands::Whoami => None,
            Commands::Decks(_) => Some(Route::Home),
            Commands::Cards(cmd) => Some(Route::DeckDetail(DeckId(cmd.deck()))),
            Commands::Study { deck } => Some(Route::Study(DeckId(*deck))),
        }
    }
}

impl CardCommands {
    fn deck(&self) -> i64 {
        match self {
            CardCommands::List { deck }
            | CardCommands::Add { deck, .. }
            | CardCommands::Edit { deck, .. }
            | CardCommands::Delete { deck, .. } => *deck,
        }
    }
}

//=========================================================================================
// Dispatch
//=========================================================================================

/// Runs one command against the terminal.
pub async fn run(cli: Cli, state: &AppState) -> Result<(), ClientError> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = io::stdout();
    execute(cli.command, state, stdin, &mut stdout).await
}

pub async fn execute<R>(
    command: Commands,
    state: &AppState,
    mut input: R,
    out: &mut dyn Write,
) -> Result<(), ClientError>
where
    R: AsyncBufRead + Unpin,
{
    if let Some(route) = command.route() {
        if let Access::Redirect(target) = state.guard.check(route) {
            return match target {
                Route::Home => {
                    writeln!(out, "Already logged in. Run `lexilearn logout` first.")?;
                    Ok(())
                }
                _ => Err(ClientError::AccessDenied(
                    "Not logged in. Run `lexilearn login <email>` first.".to_string(),
                )),
            };
        }
    }

    match command {
        Commands::Login { email, password } => {
            let password = match password {
                Some(password) => password,
                None => prompt(&mut input, out, "Password: ").await?,
            };
            state
                .session
                .login(state.gateway.as_ref(), &email, &password)
                .await?;
            writeln!(out, "Logged in as {}.", email)?;
        }
        Commands::Signup { email, password } => {
            let password = match password {
                Some(password) => password,
                None => prompt(&mut input, out, "Choose a password: ").await?,
            };
            let user = state.gateway.signup(&email, &password).await?;
            writeln!(out, "Account {} created. You can now log in.", user.email)?;
        }
        Commands::Logout => {
            state.session.logout()?;
            writeln!(out, "Logged out.")?;
        }
        Commands::Whoami => {
            let status = if state.session.is_authenticated() {
                "A session is stored."
            } else {
                "Not logged in."
            };
            writeln!(out, "{}", status)?;
        }
        Commands::Decks(cmd) => decks(cmd, state, &mut input, out).await?,
        Commands::Cards(cmd) => cards(cmd, state, &mut input, out).await?,
        Commands::Study { deck } => study(DeckId(deck), state, &mut input, out).await?,
    }
    Ok(())
}

async fn decks<R>(
    cmd: DeckCommands,
    state: &AppState,
    input: &mut R,
    out: &mut dyn Write,
) -> Result<(), ClientError>
where
    R: AsyncBufRead + Unpin,
{
    let decks = DeckCollection::new(state.gateway.clone());
    decks.load().await?;

    match cmd {
        DeckCommands::List => {
            if decks.decks().is_empty() {
                writeln!(out, "No decks yet. Create one with `lexilearn decks create <name>`.")?;
            }
            for deck in decks.decks().items() {
                writeln!(out, "{:>5}  {}  ({} cards)", deck.id, deck.name, deck.card_count)?;
            }
        }
        DeckCommands::Create { name } => {
            let deck = decks.create(&name).await?;
            writeln!(out, "Created deck {} \"{}\".", deck.id, deck.name)?;
        }
        DeckCommands::Show { deck } => {
            let deck = decks.refresh(DeckId(deck)).await?;
            writeln!(out, "{:>5}  {}  ({} cards)", deck.id, deck.name, deck.card_count)?;
        }
        DeckCommands::Rename { deck, name } => {
            let deck = decks.rename(DeckId(deck), &name).await?;
            writeln!(out, "Renamed deck {} to \"{}\".", deck.id, deck.name)?;
        }
        DeckCommands::Delete { deck, yes } => {
            let prompt = decks.delete_prompt(DeckId(deck))?;
            let confirmed = yes || ask(input, out, &prompt).await?;
            decks.delete(DeckId(deck), &move |_: &str| confirmed).await?;
            writeln!(out, "Deleted deck {}.", deck)?;
        }
    }
    Ok(())
}

async fn cards<R>(
    cmd: CardCommands,
    state: &AppState,
    input: &mut R,
    out: &mut dyn Write,
) -> Result<(), ClientError>
where
    R: AsyncBufRead + Unpin,
{
    let cards = CardCollection::new(state.gateway.clone(), DeckId(cmd.deck()));
    cards.load().await?;

    match cmd {
        CardCommands::List { .. } => {
            if cards.cards().is_empty() {
                writeln!(out, "This deck has no cards yet.")?;
            }
            for card in cards.cards().items() {
                writeln!(out, "{:>5}  Q: {}", card.id, card.question)?;
                writeln!(out, "       A: {}", card.answer)?;
            }
            if cards.can_start_study() {
                writeln!(out, "Study these with `lexilearn study {}`.", cards.deck_id())?;
            }
        }
        CardCommands::Add { question, answer, .. } => {
            let card = cards.create(CardFields::new(question, answer)).await?;
            writeln!(out, "Added card {}.", card.id)?;
        }
        CardCommands::Edit { card, question, answer, .. } => {
            let card = cards
                .update(CardId(card), CardFields::new(question, answer))
                .await?;
            writeln!(out, "Updated card {}.", card.id)?;
        }
        CardCommands::Delete { card, yes, .. } => {
            if cards.cards().get(CardId(card)).is_none() {
                return Err(CollectionError::NotFound(card.to_string()).into());
            }
            let confirmed = yes || ask(input, out, cards.delete_prompt()).await?;
            cards.delete(CardId(card), &move |_: &str| confirmed).await?;
            writeln!(out, "Deleted card {}.", card)?;
        }
    }
    Ok(())
}

//=========================================================================================
// Interactive Study
//=========================================================================================

/// Drives one study session from line input until the deck is exhausted,
/// the learner quits, or the input ends.
async fn study<R>(
    deck_id: DeckId,
    state: &AppState,
    input: &mut R,
    out: &mut dyn Write,
) -> Result<(), ClientError>
where
    R: AsyncBufRead + Unpin,
{
    let session = StudySession::new(state.gateway.clone(), deck_id, state.config.hint_policy);
    let result = study_loop(&session, state, input, out).await;
    session.abandon();
    result
}

async fn study_loop<R>(
    session: &StudySession,
    state: &AppState,
    input: &mut R,
    out: &mut dyn Write,
) -> Result<(), ClientError>
where
    R: AsyncBufRead + Unpin,
{
    report(session.fetch_next().await, out)?;

    loop {
        if !state.session.is_authenticated() {
            return Err(ClientError::AccessDenied(
                "Your session ended. Run `lexilearn login <email>` again.".to_string(),
            ));
        }

        let view = session.view();
        match view.state {
            StudyState::Exhausted => {
                writeln!(out, "No more cards are due in this deck. Well done!")?;
                return Ok(());
            }
            StudyState::Loading => {
                let label = "Press Enter to retry, or q to quit: ";
                let Some(line) = read_line(input, out, label).await? else {
                    return Ok(());
                };
                if line == "q" {
                    return Ok(());
                }
                report(session.fetch_next().await, out)?;
            }
            StudyState::Presenting => {
                if let Some(card) = &view.card {
                    writeln!(out, "\nQ: {}", card.question)?;
                }
                let label = "Your answer (? for a hint, q to quit): ";
                let Some(line) = read_line(input, out, label).await? else {
                    return Ok(());
                };
                match line.as_str() {
                    "q" => return Ok(()),
                    "?" => show_hint(session, out).await?,
                    "" => {}
                    answer => {
                        session.set_draft(answer);
                        report(session.submit_answer(answer).await, out)?;
                    }
                }
            }
            StudyState::Revealed => {
                if let Some(feedback) = &view.feedback {
                    let verdict = if feedback.was_correct {
                        "Correct!"
                    } else {
                        "Not quite..."
                    };
                    writeln!(out, "{} The answer is: {}", verdict, feedback.correct_answer)?;
                }
                let label = "Press Enter for the next card (? for a hint, q to quit): ";
                let Some(line) = read_line(input, out, label).await? else {
                    return Ok(());
                };
                match line.as_str() {
                    "q" => return Ok(()),
                    "?" => show_hint(session, out).await?,
                    _ => report(session.advance().await, out)?,
                }
            }
            StudyState::Submitting => {
                debug!("Study loop observed an in-flight submission");
            }
        }
    }
}

async fn show_hint(session: &StudySession, out: &mut dyn Write) -> Result<(), ClientError> {
    match session.fetch_hint().await {
        Ok(hint) => writeln!(out, "Hint: {}", hint)?,
        Err(StudyError::Rejected { .. }) => match session.view().hint {
            HintSlot::Ready(hint) => writeln!(out, "Hint: {}", hint)?,
            _ => writeln!(out, "No hint available right now.")?,
        },
        Err(e) => writeln!(out, "Could not get a hint: {}", e)?,
    }
    Ok(())
}

/// Prints recoverable study failures and passes everything else through.
fn report<T>(result: Result<T, StudyError>, out: &mut dyn Write) -> Result<(), ClientError> {
    match result {
        Ok(_) => Ok(()),
        Err(StudyError::Api(e)) if !e.is_unauthorized() => {
            writeln!(out, "Something went wrong: {}", e)?;
            Ok(())
        }
        Err(StudyError::Api(_)) => Ok(()),
        Err(e @ StudyError::Rejected { .. }) | Err(e @ StudyError::Stale) => {
            debug!("Ignored study action: {}", e);
            Ok(())
        }
    }
}

//=========================================================================================
// Line Input
//=========================================================================================

async fn read_line<R>(
    input: &mut R,
    out: &mut dyn Write,
    label: &str,
) -> Result<Option<String>, ClientError>
where
    R: AsyncBufRead + Unpin,
{
    write!(out, "{}", label)?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

async fn prompt<R>(input: &mut R, out: &mut dyn Write, label: &str) -> Result<String, ClientError>
where
    R: AsyncBufRead + Unpin,
{
    read_line(input, out, label)
        .await?
        .ok_or_else(|| ClientError::Internal("No input given".to_string()))
}

/// Asks a yes/no question. Anything but `y` or `yes`, including end of input, is a no.
async fn ask<R>(input: &mut R, out: &mut dyn Write, question: &str) -> Result<bool, ClientError>
where
    R: AsyncBufRead + Unpin,
{
    let answer = read_line(input, out, &format!("{} [y/N] ", question)).await?;
    Ok(matches!(
        answer.map(|a| a.to_ascii_lowercase()).as_deref(),
        Some("y" | "yes")
    ))
}

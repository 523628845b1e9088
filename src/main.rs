use chrono::Local;
use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use crossterm::{
    cursor::MoveTo,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute, queue,
    style::{Print, PrintStyledContent, Stylize},
    terminal::{
        disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen,
    },
    tty::IsTty,
};
use itertools::Itertools;
use keytrace::{
    analysis::{delay_profile, failmap, key_heat, replay, sequence_summaries},
    classifier::{classify, summarize},
    config::{Config, ConfigStore, FileConfigStore},
    input::{CharState, TypingPage},
    keyboard::KeyboardLayout,
    ledger::{Key, KeystrokeEvent, Ledger, SequenceId, SourceText},
    pager::{Pagination, PatternSet},
    ranges::Pattern,
    segmenter::{segment, PartKind},
    RecordingSession, Store, TextEdit, TextRecord,
};
use log::info;
use std::{
    cmp::Reverse,
    error::Error,
    fs,
    io::{self, stdin, Write},
    path::PathBuf,
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};
use time_humanize::HumanTime;

const TICK_RATE_MS: u64 = 250;

/// typing practice on your own texts, with a keystroke ledger and typo analysis
#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
pub struct Cli {
    /// config file to use instead of the default location
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// database file to use instead of the configured one
    #[clap(long, global = true)]
    database: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Command {
    /// manage practice texts
    Texts {
        #[clap(subcommand)]
        action: TextsAction,
    },
    /// list the pages of the active text
    Pages {
        /// move the reading position to the start of page N (1-based)
        #[clap(long)]
        goto: Option<usize>,
    },
    /// type the active page of the active text
    Practice,
    /// list recorded sequences, newest first
    Sequences,
    /// show a sequence split into correct, wrong and erased runs
    Show { id: SequenceId },
    /// print the raw keystrokes of a sequence
    Raw { id: SequenceId },
    /// replay a sequence keystroke by keystroke
    Replay {
        id: SequenceId,
        /// playback speed multiplier, 0 prints every frame at once
        #[clap(long, default_value_t = 1.0)]
        speed: f64,
    },
    /// classify typos by kind
    Typos {
        /// only look at one sequence
        #[clap(long)]
        sequence: Option<SequenceId>,
        /// print every typo as csv
        #[clap(long)]
        csv: bool,
    },
    /// miss rate per character
    Failmap {
        /// draw the miss rates on the keyboard
        #[clap(long)]
        keyboard: bool,
    },
    /// delete a sequence and its keystrokes
    Delete { id: SequenceId },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum TextsAction {
    /// add a text from a file
    Add {
        name: String,
        file: PathBuf,
        /// minimum page length in characters
        #[clap(long)]
        threshold: Option<usize>,
    },
    List,
    /// change the name, page threshold or patterns of a text
    Edit {
        id: i64,
        #[clap(long)]
        name: Option<String>,
        /// minimum page length in characters
        #[clap(long)]
        threshold: Option<usize>,
        /// json file with break, ignore and replacement patterns
        #[clap(long)]
        patterns: Option<PathBuf>,
    },
    Remove { id: i64 },
    /// make a text the one `pages` and `practice` work on
    Activate { id: i64 },
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let config_store = match &cli.config {
        Some(path) => FileConfigStore::with_path(path),
        None => FileConfigStore::new(),
    };
    let mut cfg = config_store.load();
    let mut store = open_store(&cli, &cfg)?;

    match cli.command {
        Command::Texts { action } => texts(action, &mut store, &config_store, &mut cfg),
        Command::Pages { goto } => pages(goto, &store, &config_store, &mut cfg),
        Command::Practice => {
            if !stdin().is_tty() {
                let mut cmd = Cli::command();
                cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
            }
            practice(&mut store, &config_store, &mut cfg)
        }
        Command::Sequences => sequences(&store),
        Command::Show { id } => show(&store, id),
        Command::Raw { id } => raw(&store, id),
        Command::Replay { id, speed } => replay_sequence(&store, id, speed),
        Command::Typos { sequence, csv } => typos(&store, sequence, csv),
        Command::Failmap { keyboard } => failmap_report(&store, keyboard),
        Command::Delete { id } => {
            sequence_events(&store, id)?;
            store.delete_sequence(id)?;
            println!("deleted sequence {id}");
            Ok(())
        }
    }
}

fn open_store(cli: &Cli, cfg: &Config) -> Result<Store, Box<dyn Error>> {
    let path = cli
        .database
        .clone()
        .or_else(|| cfg.database_path())
        .ok_or("could not resolve a database location, pass --database")?;
    info!("using database {}", path.display());
    let mut store = Store::open(path)?;
    store.seed_base_texts()?;
    Ok(store)
}

fn active_text(store: &Store, cfg: &Config) -> Result<(i64, TextRecord), Box<dyn Error>> {
    let id = cfg
        .active_text
        .ok_or("no active text, add one with `keytrace texts add <name> <file>`")?;
    let text = store
        .text(id)?
        .ok_or_else(|| format!("active text {id} no longer exists"))?;
    Ok((id, text))
}

fn sequence_events(store: &Store, id: SequenceId) -> Result<Vec<KeystrokeEvent>, Box<dyn Error>> {
    if store.sequence(id)?.is_none() {
        return Err(format!("sequence {id} not found").into());
    }
    Ok(store.read_all(Some(id))?)
}

/// Single line rendering of a text fragment
fn visible(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\n' => '⏎',
            '\t' => '⇥',
            c => c,
        })
        .collect()
}

fn preview(s: &str, max: usize) -> String {
    let shown = visible(s);
    if shown.chars().count() <= max {
        return shown;
    }
    let mut cut: String = shown.chars().take(max).collect();
    cut.push('…');
    cut
}

fn texts(
    action: TextsAction,
    store: &mut Store,
    config_store: &FileConfigStore,
    cfg: &mut Config,
) -> Result<(), Box<dyn Error>> {
    match action {
        TextsAction::Add { name, file, threshold } => {
            let content = fs::read_to_string(&file)?;
            let mut record = TextRecord::new(name, content);
            record.patterns = cfg.patterns.clone();
            record.page_threshold = threshold.unwrap_or(cfg.page_threshold);
            let page_count = record.paginate(0)?.page_count();
            let id = store.save_text(&record)?;
            if cfg.active_text.is_none() {
                cfg.active_text = Some(id);
                config_store.save(cfg)?;
            }
            println!("added text {id} ({page_count} pages)");
        }
        TextsAction::List => {
            let texts = store.texts()?;
            if texts.is_empty() {
                println!("no texts, add one with `keytrace texts add <name> <file>`");
            }
            for text in texts {
                let Some(id) = text.id else { continue };
                let marker = if cfg.active_text == Some(id) { '*' } else { ' ' };
                let pagination = text.paginate(cfg.position(id))?;
                println!(
                    "{marker} {id:>4}  {:<30} {:>8} chars  page {}/{}  {:.2}%",
                    text.name,
                    text.text.chars().count(),
                    pagination.active_page + 1,
                    pagination.page_count(),
                    pagination.progress(pagination.active_page),
                );
            }
        }
        TextsAction::Edit {
            id,
            name,
            threshold,
            patterns,
        } => {
            let patterns = match patterns {
                Some(file) => Some(serde_json::from_str::<PatternSet>(&fs::read_to_string(file)?)?),
                None => None,
            };
            let edit = TextEdit {
                name,
                page_threshold: threshold,
                patterns,
            };
            let record = store.edit_text(id, edit)?;
            let pagination = record.paginate(cfg.position(id))?;
            println!("updated text {id} ({} pages)", pagination.page_count());
        }
        TextsAction::Remove { id } => {
            store.text(id)?.ok_or_else(|| format!("text {id} not found"))?;
            store.remove_text(id)?;
            cfg.positions.remove(&id);
            if cfg.active_text == Some(id) {
                cfg.active_text = None;
            }
            config_store.save(cfg)?;
            println!("removed text {id}");
        }
        TextsAction::Activate { id } => {
            let text = store.text(id)?.ok_or_else(|| format!("text {id} not found"))?;
            cfg.active_text = Some(id);
            config_store.save(cfg)?;
            println!("now practicing {}", text.name);
        }
    }
    Ok(())
}

fn pages(
    goto: Option<usize>,
    store: &Store,
    config_store: &FileConfigStore,
    cfg: &mut Config,
) -> Result<(), Box<dyn Error>> {
    let (id, text) = active_text(store, cfg)?;
    let mut pagination = text.paginate(cfg.position(id))?;

    if let Some(n) = goto {
        if n == 0 || n > pagination.page_count() {
            return Err(format!("page must be between 1 and {}", pagination.page_count()).into());
        }
        pagination.active_page = n - 1;
        cfg.set_position(id, pagination.offset_of(pagination.active_page));
        config_store.save(cfg)?;
    }

    println!("{}", text.name);
    for (i, page) in pagination.pages.iter().enumerate() {
        let marker = if i == pagination.active_page { '>' } else { ' ' };
        println!(
            "{marker} {:>4}  {:>6.2}%  {:>5} chars  {}",
            i + 1,
            pagination.progress(i),
            page.chars().count(),
            preview(page.trim_start(), 50),
        );
    }
    Ok(())
}

fn sequences(store: &Store) -> Result<(), Box<dyn Error>> {
    let summaries = sequence_summaries(store)?;
    if summaries.is_empty() {
        println!("no sequences recorded yet");
    }
    let now = Local::now();
    for summary in summaries {
        let sequence = &summary.sequence;
        let age = HumanTime::from_seconds(-(now - sequence.start_time).num_seconds()).to_string();
        println!(
            "{:>14}  {}  {:<18} {:<20} {:>5} keys  {}",
            sequence.id,
            sequence.start_time.format("%Y-%m-%d %H:%M"),
            age,
            sequence.source_text_name.as_deref().unwrap_or("-"),
            summary.keystrokes,
            preview(&summary.text, 40),
        );
    }
    Ok(())
}

fn show(store: &Store, id: SequenceId) -> Result<(), Box<dyn Error>> {
    let events = sequence_events(store, id)?;
    let parts = segment(&events);

    let mut stdout = io::stdout();
    for part in &parts {
        let shown = visible(&part.text);
        let styled = match part.kind {
            PartKind::Correct => shown.green(),
            PartKind::Wrong => shown.red(),
            PartKind::Erased => shown.dark_grey().crossed_out(),
        };
        queue!(stdout, PrintStyledContent(styled))?;
    }
    queue!(stdout, Print("\n\n"))?;
    stdout.flush()?;

    for part in &parts {
        let wpm = part.words_per_minute.map_or_else(|| "-".to_string(), |w| w.to_string());
        let note = if part.kind == PartKind::Wrong {
            format!("expected {}", visible(&part.expected))
        } else {
            String::new()
        };
        println!("{:<8} {:>4}  {:<30} {note}", part.kind.to_string(), wpm, visible(&part.text));
    }
    if let Some(profile) = delay_profile(&events) {
        println!(
            "\ndelay {:.0}ms ± {:.0}ms over {} keystrokes",
            profile.mean_ms, profile.std_dev_ms, profile.samples
        );
    }
    println!("{} typos", classify(&events).len());
    Ok(())
}

fn raw(store: &Store, id: SequenceId) -> Result<(), Box<dyn Error>> {
    for e in sequence_events(store, id)? {
        let entered = match e.entered {
            Key::Char(c) => format!("{c:?}"),
            Key::Backspace => e.entered.to_string(),
        };
        println!(
            "{:>5}  {:>6}  {:>6}  {:>6}ms",
            e.sequence_number,
            format!("{:?}", e.expected),
            entered,
            e.delay_ms
        );
    }
    Ok(())
}

fn replay_sequence(store: &Store, id: SequenceId, speed: f64) -> Result<(), Box<dyn Error>> {
    let events = sequence_events(store, id)?;
    let mut previous_ms = 0;
    for frame in replay(&events) {
        if speed > 0.0 {
            let wait = (frame.at_ms - previous_ms) as f64 / 1000.0 / speed;
            thread::sleep(Duration::from_secs_f64(wait));
        }
        previous_ms = frame.at_ms;
        let shown = visible(&frame.text);
        let tail: String = shown.chars().rev().take(60).collect::<Vec<_>>().into_iter().rev().collect();
        println!("{:>8.2}s  {tail}", frame.at_ms as f64 / 1000.0);
    }
    Ok(())
}

fn typos(store: &Store, sequence: Option<SequenceId>, csv: bool) -> Result<(), Box<dyn Error>> {
    let events = match sequence {
        Some(id) => sequence_events(store, id)?,
        None => store.read_all(None)?,
    };
    let records = classify(&events);

    if csv {
        let mut wtr = csv::Writer::from_writer(io::stdout());
        wtr.write_record(["expected", "typo_type", "offending"])?;
        for record in &records {
            wtr.write_record([
                record.expected.to_string(),
                record.typo_type.to_string(),
                record.offending.to_string(),
            ])?;
        }
        wtr.flush()?;
        return Ok(());
    }

    if records.is_empty() {
        println!("no typos");
        return Ok(());
    }
    let summaries = summarize(&records);
    for (c, summary) in summaries.iter().sorted_by_key(|(_, s)| Reverse(s.total())) {
        let by_type = summary
            .counts_by_type
            .iter()
            .map(|(kind, n)| format!("{kind} {n}"))
            .join(", ");
        println!("{:>3} {:>5}  {by_type}", visible(&c.to_string()), summary.total());
    }
    println!("{} typos", records.len());
    Ok(())
}

fn failmap_report(store: &Store, keyboard: bool) -> Result<(), Box<dyn Error>> {
    let map = failmap(&store.read_all(None)?);

    if keyboard {
        let layout = KeyboardLayout::us();
        let heat = key_heat(&map, layout);
        for (r, row) in layout.rows().iter().enumerate() {
            let line = row
                .iter()
                .map(|key| {
                    let label = key.chars.first().copied().unwrap_or(' ');
                    match heat.get(&(key.row, key.col)) {
                        Some(info) if info.total > 0 => format!("{label}{:>3.0}", info.ratio * 100.0),
                        _ => format!("{label}  -"),
                    }
                })
                .join(" ");
            println!("{}{line}", " ".repeat(r * 2));
        }
        return Ok(());
    }

    for (c, info) in map.iter().sorted_by(|a, b| b.1.ratio.total_cmp(&a.1.ratio)) {
        println!(
            "{:>3} {:>6} {:>6} {:>6.1}%",
            visible(&c.to_string()),
            info.total,
            info.misstypes,
            info.ratio * 100.0
        );
    }
    Ok(())
}

#[derive(Debug, Clone)]
enum PracticeEvent {
    Key(KeyEvent),
    Resize,
    Tick,
}

fn get_practice_events() -> mpsc::Receiver<PracticeEvent> {
    let (tx, rx) = mpsc::channel();

    let tick_x = tx.clone();
    thread::spawn(move || loop {
        if tick_x.send(PracticeEvent::Tick).is_err() {
            break;
        }
        thread::sleep(Duration::from_millis(TICK_RATE_MS))
    });

    thread::spawn(move || loop {
        let evt = match event::read() {
            Ok(Event::Key(key)) => PracticeEvent::Key(key),
            Ok(Event::Resize(_, _)) => PracticeEvent::Resize,
            Ok(_) => continue,
            Err(_) => break,
        };
        if tx.send(evt).is_err() {
            break;
        }
    });

    rx
}

/// State of one `practice` run
struct Practice {
    text_id: i64,
    name: String,
    source: Option<SourceText>,
    ignore: Vec<Pattern>,
    pagination: Pagination,
    page_index: usize,
    page: TypingPage,
    clock: Instant,
    finished: bool,
}

impl Practice {
    fn new(text_id: i64, text: &TextRecord, saved_offset: usize) -> Result<Self, Box<dyn Error>> {
        let ignore = text.compile_patterns()?.ignore;
        let pagination = text.paginate(saved_offset)?;
        let page_index = pagination.active_page;
        let page = TypingPage::new(&pagination.pages[page_index], &ignore)?;
        Ok(Self {
            text_id,
            name: text.name.clone(),
            source: text.source(),
            ignore,
            pagination,
            page_index,
            page,
            clock: Instant::now(),
            finished: false,
        })
    }

    fn now_ms(&self) -> u64 {
        self.clock.elapsed().as_millis() as u64
    }

    fn reset_page(&mut self) -> Result<(), Box<dyn Error>> {
        self.page = TypingPage::new(&self.pagination.pages[self.page_index], &self.ignore)?;
        Ok(())
    }

    /// Move to the next page and save the reading position
    fn advance(&mut self, config_store: &FileConfigStore, cfg: &mut Config) -> Result<(), Box<dyn Error>> {
        if self.page_index + 1 < self.pagination.page_count() {
            self.page_index += 1;
            cfg.set_position(self.text_id, self.pagination.offset_of(self.page_index));
            self.reset_page()?;
        } else {
            cfg.set_position(self.text_id, self.pagination.total_chars());
            self.finished = true;
        }
        config_store.save(cfg)?;
        Ok(())
    }

    fn draw(&self, out: &mut impl Write) -> io::Result<()> {
        queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;
        queue!(
            out,
            Print(format!(
                "{}  page {}/{}  {:.2}%\r\n\r\n",
                self.name,
                self.page_index + 1,
                self.pagination.page_count(),
                self.pagination.progress(self.page_index),
            ))
        )?;

        if self.finished {
            queue!(out, Print("text finished, press any key to quit\r\n"))?;
            return out.flush();
        }

        for unit in self.page.units() {
            let shown = match (unit.printable, unit.text.as_str()) {
                (true, "\n") => "⏎\r\n".to_string(),
                _ => unit.text.replace('\n', "\r\n"),
            };
            let styled = match unit.state {
                _ if !unit.printable => shown.dark_grey(),
                CharState::Done => shown.green(),
                CharState::Errored => shown.red(),
                CharState::Active => shown.reverse(),
                CharState::Normal => shown.grey(),
            };
            queue!(out, PrintStyledContent(styled))?;
        }

        let stats = self.page.stats(self.now_ms());
        queue!(
            out,
            Print(format!(
                "\r\n\r\n{} wpm  {} errors  {:.1}s\r\n",
                stats.wpm,
                stats.errors,
                stats.elapsed_ms as f64 / 1000.0
            )),
            Print("esc quit  ← restart page\r\n"),
        )?;
        out.flush()
    }
}

fn practice(store: &mut Store, config_store: &FileConfigStore, cfg: &mut Config) -> Result<(), Box<dyn Error>> {
    let (id, text) = active_text(store, cfg)?;
    let mut state = Practice::new(id, &text, cfg.position(id))?;
    let mut session = RecordingSession::start(store, state.source.as_ref())?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;

    let result = run_practice(&mut stdout, &mut state, &mut session, store, config_store, cfg);

    disable_raw_mode()?;
    execute!(stdout, LeaveAlternateScreen)?;
    session.finish(store)?;
    result
}

fn run_practice(
    out: &mut impl Write,
    state: &mut Practice,
    session: &mut RecordingSession,
    store: &mut Store,
    config_store: &FileConfigStore,
    cfg: &mut Config,
) -> Result<(), Box<dyn Error>> {
    let events = get_practice_events();
    state.draw(out)?;

    loop {
        let key = match events.recv()? {
            PracticeEvent::Tick => {
                if !state.finished && state.page.stats(state.now_ms()).elapsed_ms > 0 {
                    state.draw(out)?;
                }
                continue;
            }
            PracticeEvent::Resize => {
                state.draw(out)?;
                continue;
            }
            PracticeEvent::Key(key) => key,
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        if state.finished {
            return Ok(());
        }

        let typed = match key.code {
            KeyCode::Esc => return Ok(()),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return Ok(()),
            KeyCode::Left => {
                state.reset_page()?;
                session.restart(store, state.source.as_ref())?;
                None
            }
            KeyCode::Backspace => Some(Key::Backspace),
            KeyCode::Enter => Some(Key::Char('\n')),
            KeyCode::Tab => Some(Key::Char('\t')),
            KeyCode::Char(c) => Some(Key::Char(c)),
            _ => None,
        };

        if let Some(key) = typed {
            let at_ms = state.now_ms();
            if let Some(press) = state.page.input(key, at_ms) {
                session.record(store, &press)?;
            }
            if state.page.is_complete() {
                state.advance(config_store, cfg)?;
                session.restart(store, state.source.as_ref())?;
            }
        }
        state.draw(out)?;
    }
}

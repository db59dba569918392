//! Lilly console: the terminal chat client.
//!
//! All durable state (archive, preferences, memos) lives on this machine;
//! the gateway only ever sees the current message, persona, and session name.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, TimeZone, Timelike};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lilly_core::archive::{MessageArchive, Sender};
use lilly_core::client::GatewayClient;
use lilly_core::controller::{ChatSessionController, TurnOutcome};
use lilly_core::persona::{Lang, Style, Tone};
use lilly_core::prefs::PreferenceStore;

const SEARCH_LIMIT: usize = 100;
const REPLAY_LIMIT: usize = 50;
const DEFAULT_GATEWAY: &str = "http://localhost:3000";
const DEFAULT_CITY: &str = "Riyadh";

/// One parsed input line: either a slash command or a chat message.
#[derive(Debug, PartialEq)]
enum Command<'a> {
    Chat(&'a str),
    Help,
    Search(&'a str),
    Export(&'a str),
    Import(&'a str),
    Purge { confirmed: bool },
    Memo(&'a str),
    Memos,
    MemosClear,
    Private(bool),
    Stats,
    PersonaShow,
    PersonaSet(&'a str),
    Session(&'a str),
    Quit,
    Unknown(&'a str),
}

fn parse_line(line: &str) -> Command<'_> {
    let line = line.trim();
    if !line.starts_with('/') {
        return Command::Chat(line);
    }
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    match head {
        "/help" => Command::Help,
        "/search" => Command::Search(rest),
        "/export" => Command::Export(rest),
        "/import" => Command::Import(rest),
        "/purge" => Command::Purge {
            confirmed: rest == "confirm",
        },
        "/memo" => Command::Memo(rest),
        "/memos" if rest == "clear" => Command::MemosClear,
        "/memos" => Command::Memos,
        "/private" => match rest {
            "on" => Command::Private(true),
            "off" => Command::Private(false),
            other => Command::Unknown(if other.is_empty() { head } else { other }),
        },
        "/stats" => Command::Stats,
        "/persona" if rest.is_empty() => Command::PersonaShow,
        "/persona" => Command::PersonaSet(rest),
        "/session" if !rest.is_empty() => Command::Session(rest),
        "/quit" | "/exit" => Command::Quit,
        _ => Command::Unknown(head),
    }
}

/// 12-hour clock with the Arabic ص/م markers.
fn format_time_12(ts: i64) -> String {
    let time = Local
        .timestamp_millis_opt(ts)
        .single()
        .unwrap_or_else(Local::now);
    let hour24 = time.hour();
    let suffix = if hour24 >= 12 { "م" } else { "ص" };
    let hour = match hour24 % 12 {
        0 => 12,
        h => h,
    };
    format!("{}:{:02} {}", hour, time.minute(), suffix)
}

fn render_line(sender: Sender, text: &str, ts: i64) -> String {
    let who = match sender {
        Sender::User => "مامي",
        Sender::Assistant => "Lilly",
    };
    format!("[{}] {}: {}", format_time_12(ts), who, text)
}

/// Storage failures inside the command loop print this line and keep the
/// console alive instead of exiting.
fn storage_apology(err: impl std::fmt::Display) -> String {
    format!("مامي، حدث خطأ في التخزين المحلي: {}\n", err)
}

async fn export_archive(archive: &MessageArchive, path: &str) -> String {
    let bytes = match archive.export_all() {
        Ok(bytes) => bytes,
        Err(err) => return format!("تعذّر التصدير: {}\n", err),
    };
    match tokio::fs::write(path, bytes).await {
        Ok(()) => format!("تم التصدير إلى {}\n", path),
        Err(err) => format!("تعذّر التصدير: {}\n", err),
    }
}

async fn import_archive(archive: &MessageArchive, path: &str) -> String {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) => return format!("تعذّر قراءة الملف: {}\n", err),
    };
    match archive.import_all(&bytes) {
        Ok(count) => format!("تم استيراد {} رسالة.\n", count),
        Err(err) => format!("تعذّر الاستيراد: {}\n", err),
    }
}

fn data_dir() -> PathBuf {
    std::env::var("LILLY_DATA_DIR")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./data/lilly"))
}

const HELP: &str = "\
الأوامر:
  /search <كلمة>      البحث في كل المحادثات
  /export <ملف>       تصدير الأرشيف إلى ملف JSON
  /import <ملف>       استيراد أرشيف من ملف JSON
  /purge confirm      مسح الأرشيف كاملًا
  /memo <نص>          حفظ ذكرى جديدة
  /memos              عرض الذكريات
  /memos clear        مسح الذكريات
  /private on|off     وضع الخصوصية (لا حفظ)
  /stats              عدد الرسائل المحفوظة
  /persona            عرض إعدادات الشخصية
  /persona key=value  ضبط style/tone/lang/tutor
  /session <اسم>      تبديل الجلسة
  /quit               خروج";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(err) = run().await {
        eprintln!("خطأ في بدء التشغيل: {}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let dir = data_dir();
    std::fs::create_dir_all(&dir)?;

    let prefs_store = PreferenceStore::open_path(dir.join("prefs"))?;
    let memos = prefs_store.memos()?;
    let prefs = prefs_store.load()?;

    let archive = Arc::new(MessageArchive::open_path(dir.join("archive"))?);
    archive.set_private_mode(prefs.private_mode);

    let gateway_url =
        std::env::var("LILLY_GATEWAY_URL").unwrap_or_else(|_| DEFAULT_GATEWAY.to_string());
    let client = Arc::new(GatewayClient::new(gateway_url));

    let prefs = Arc::new(RwLock::new(prefs));
    let controller =
        ChatSessionController::new(archive.clone(), prefs.clone(), client.clone());

    let mut out = tokio::io::stdout();

    // Header: date line, then a weather line when the gateway answers.
    out.write_all(format!("📅 {}\n", Local::now().format("%Y-%m-%d")).as_bytes())
        .await?;
    if let Some(line) = client.weather(DEFAULT_CITY).await {
        out.write_all(format!("☁ {}\n", line).as_bytes()).await?;
    }
    {
        let prefs = prefs.read().await;
        out.write_all(
            format!(
                "أهلًا مامي — الجلسة: {}{}\n",
                prefs.session,
                if prefs.private_mode { " (خصوصية)" } else { "" }
            )
            .as_bytes(),
        )
        .await?;
        if !prefs.private_mode {
            for msg in archive.recent(&prefs.session, REPLAY_LIMIT)? {
                out.write_all(
                    format!("{}\n", render_line(msg.sender, &msg.text, msg.ts)).as_bytes(),
                )
                .await?;
            }
        }
    }
    out.write_all("> ".as_bytes()).await?;
    out.flush().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            Command::Chat("") => {}
            Command::Chat(text) => match controller.submit(text).await {
                Ok(TurnOutcome::Reply(reply)) => {
                    out.write_all(
                        format!("{}\n", render_line(reply.sender, &reply.text, reply.ts))
                            .as_bytes(),
                    )
                    .await?;
                }
                Ok(TurnOutcome::Busy) => {
                    out.write_all("لحظة مامي، ما زلت أجهّز الرد السابق.\n".as_bytes())
                        .await?;
                }
                Ok(TurnOutcome::Empty) => {}
                Err(err) => out.write_all(storage_apology(err).as_bytes()).await?,
            },
            Command::Help => out.write_all(format!("{}\n", HELP).as_bytes()).await?,
            Command::Search("") => {
                out.write_all("اكتبي كلمة للبحث: /search <كلمة>\n".as_bytes())
                    .await?;
            }
            Command::Search(query) => match archive.search(query, SEARCH_LIMIT) {
                Ok(hits) => {
                    if hits.is_empty() {
                        out.write_all(format!("لا نتائج للبحث: {}\n", query).as_bytes())
                            .await?;
                    }
                    for hit in hits {
                        out.write_all(
                            format!(
                                "{} • {} • {}\n  {}\n",
                                hit.session,
                                format_time_12(hit.ts),
                                hit.sender.as_str(),
                                hit.text
                            )
                            .as_bytes(),
                        )
                        .await?;
                    }
                }
                Err(err) => out.write_all(storage_apology(err).as_bytes()).await?,
            },
            Command::Export("") | Command::Import("") => {
                out.write_all("حدّدي مسار الملف.\n".as_bytes()).await?;
            }
            Command::Export(path) => {
                out.write_all(export_archive(&archive, path).await.as_bytes())
                    .await?;
            }
            Command::Import(path) => {
                out.write_all(import_archive(&archive, path).await.as_bytes())
                    .await?;
            }
            Command::Purge { confirmed: false } => {
                out.write_all(
                    "لمسح الأرشيف كاملًا اكتبي: /purge confirm\n".as_bytes(),
                )
                .await?;
            }
            Command::Purge { confirmed: true } => match archive.purge() {
                Ok(()) => out.write_all("تم مسح الأرشيف.\n".as_bytes()).await?,
                Err(err) => out.write_all(storage_apology(err).as_bytes()).await?,
            },
            Command::Memo("") => {
                out.write_all("اكتبي نص الذكرى: /memo <نص>\n".as_bytes()).await?;
            }
            Command::Memo(text) => match memos.add(text) {
                Ok(_) => out.write_all("انحفظت الذكرى.\n".as_bytes()).await?,
                Err(err) => out.write_all(storage_apology(err).as_bytes()).await?,
            },
            Command::Memos => match memos.list() {
                Ok(list) => {
                    if list.is_empty() {
                        out.write_all("لا ذكريات بعد.\n".as_bytes()).await?;
                    }
                    for memo in list {
                        out.write_all(
                            format!("[{}] {}\n", format_time_12(memo.ts), memo.text).as_bytes(),
                        )
                        .await?;
                    }
                }
                Err(err) => out.write_all(storage_apology(err).as_bytes()).await?,
            },
            Command::MemosClear => match memos.clear() {
                Ok(()) => out.write_all("تم مسح الذكريات.\n".as_bytes()).await?,
                Err(err) => out.write_all(storage_apology(err).as_bytes()).await?,
            },
            Command::Private(on) => {
                archive.set_private_mode(on);
                let snapshot = {
                    let mut prefs = prefs.write().await;
                    prefs.private_mode = on;
                    prefs.clone()
                };
                if let Err(err) = prefs_store.save(&snapshot) {
                    out.write_all(storage_apology(err).as_bytes()).await?;
                }
                if on {
                    out.write_all("وضع الخصوصية مفعّل: لن تُحفظ الرسائل.\n".as_bytes())
                        .await?;
                } else {
                    out.write_all("وضع الخصوصية متوقف.\n".as_bytes()).await?;
                    match archive.recent(&snapshot.session, REPLAY_LIMIT) {
                        Ok(msgs) => {
                            for msg in msgs {
                                out.write_all(
                                    format!("{}\n", render_line(msg.sender, &msg.text, msg.ts))
                                        .as_bytes(),
                                )
                                .await?;
                            }
                        }
                        Err(err) => out.write_all(storage_apology(err).as_bytes()).await?,
                    }
                }
            }
            Command::Stats => {
                let session = prefs.read().await.session.clone();
                out.write_all(
                    format!(
                        "الرسائل المحفوظة: {} — الجلسة الحالية: {}\n",
                        archive.len(),
                        session
                    )
                    .as_bytes(),
                )
                .await?;
            }
            Command::PersonaShow => {
                let prefs = prefs.read().await;
                let p = prefs.persona;
                out.write_all(
                    format!(
                        "style={} tone={} lang={} tutor={}\n",
                        p.style.as_str(),
                        p.tone.as_str(),
                        p.lang.as_str(),
                        if p.tutor { "on" } else { "off" }
                    )
                    .as_bytes(),
                )
                .await?;
            }
            Command::PersonaSet(args) => {
                let snapshot = {
                    let mut prefs = prefs.write().await;
                    apply_persona_args(&mut prefs.persona, args);
                    prefs.clone()
                };
                if let Err(err) = prefs_store.save(&snapshot) {
                    out.write_all(storage_apology(err).as_bytes()).await?;
                }
                out.write_all("تم تحديث الشخصية.\n".as_bytes()).await?;
            }
            Command::Session(name) => {
                let snapshot = {
                    let mut prefs = prefs.write().await;
                    prefs.session = name.to_string();
                    prefs.clone()
                };
                if let Err(err) = prefs_store.save(&snapshot) {
                    out.write_all(storage_apology(err).as_bytes()).await?;
                }
                out.write_all(format!("الجلسة الآن: {}\n", name).as_bytes())
                    .await?;
                match archive.recent(name, REPLAY_LIMIT) {
                    Ok(msgs) => {
                        for msg in msgs {
                            out.write_all(
                                format!("{}\n", render_line(msg.sender, &msg.text, msg.ts))
                                    .as_bytes(),
                            )
                            .await?;
                        }
                    }
                    Err(err) => out.write_all(storage_apology(err).as_bytes()).await?,
                }
            }
            Command::Quit => break,
            Command::Unknown(what) => {
                out.write_all(
                    format!("أمر غير معروف: {} — جرّبي /help\n", what).as_bytes(),
                )
                .await?;
            }
        }
        out.write_all("> ".as_bytes()).await?;
        out.flush().await?;
    }

    out.write_all("مع السلامة مامي.\n".as_bytes()).await?;
    Ok(())
}

/// Apply `key=value` pairs to the persona. Unrecognized keys are ignored;
/// unrecognized values fall back to that field's default.
fn apply_persona_args(persona: &mut lilly_core::persona::Persona, args: &str) {
    for pair in args.split_whitespace() {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        match key {
            "style" => persona.style = Style::from_str(value),
            "tone" => persona.tone = Tone::from_str(value),
            "lang" => persona.lang = Lang::from_str(value),
            "tutor" => persona.tutor = matches!(value, "on" | "true"),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lilly_core::persona::Persona;

    #[test]
    fn test_parse_chat_and_commands() {
        assert_eq!(parse_line("مرحبا"), Command::Chat("مرحبا"));
        assert_eq!(parse_line("  /help  "), Command::Help);
        assert_eq!(parse_line("/search اجتماع"), Command::Search("اجتماع"));
        assert_eq!(parse_line("/export out.json"), Command::Export("out.json"));
        assert_eq!(parse_line("/purge"), Command::Purge { confirmed: false });
        assert_eq!(parse_line("/purge confirm"), Command::Purge { confirmed: true });
        assert_eq!(parse_line("/memo اشتري حليب"), Command::Memo("اشتري حليب"));
        assert_eq!(parse_line("/memos"), Command::Memos);
        assert_eq!(parse_line("/memos clear"), Command::MemosClear);
        assert_eq!(parse_line("/private on"), Command::Private(true));
        assert_eq!(parse_line("/private off"), Command::Private(false));
        assert_eq!(parse_line("/stats"), Command::Stats);
        assert_eq!(parse_line("/persona"), Command::PersonaShow);
        assert_eq!(
            parse_line("/persona lang=english tutor=on"),
            Command::PersonaSet("lang=english tutor=on")
        );
        assert_eq!(parse_line("/session عمل"), Command::Session("عمل"));
        assert_eq!(parse_line("/quit"), Command::Quit);
        assert_eq!(parse_line("/bogus"), Command::Unknown("/bogus"));
    }

    #[test]
    fn test_apply_persona_args() {
        let mut persona = Persona::default();
        apply_persona_args(&mut persona, "style=concise tone=pro lang=english tutor=on");
        assert_eq!(persona.style, Style::Concise);
        assert_eq!(persona.tone, Tone::Pro);
        assert_eq!(persona.lang, Lang::English);
        assert!(persona.tutor);

        // Unknown keys and values degrade, never fail.
        apply_persona_args(&mut persona, "style=nonsense color=red tutor=off");
        assert_eq!(persona.style, Style::Friendly);
        assert!(!persona.tutor);
    }

    #[tokio::test]
    async fn test_export_failure_reports_instead_of_exiting() {
        let dir = tempfile::tempdir().unwrap();
        let archive = MessageArchive::open_path(dir.path().join("archive")).unwrap();

        let bad = dir.path().join("no-such-dir").join("out.json");
        let line = export_archive(&archive, bad.to_str().unwrap()).await;
        assert!(line.starts_with("تعذّر التصدير"), "got: {}", line);

        let good = dir.path().join("out.json");
        let line = export_archive(&archive, good.to_str().unwrap()).await;
        assert!(line.starts_with("تم التصدير"), "got: {}", line);
    }

    #[tokio::test]
    async fn test_import_failure_reports_instead_of_exiting() {
        let dir = tempfile::tempdir().unwrap();
        let archive = MessageArchive::open_path(dir.path().join("archive")).unwrap();

        let missing = dir.path().join("missing.json");
        let line = import_archive(&archive, missing.to_str().unwrap()).await;
        assert!(line.starts_with("تعذّر قراءة الملف"), "got: {}", line);

        let malformed = dir.path().join("malformed.json");
        std::fs::write(&malformed, b"{\"not\":\"an array\"}").unwrap();
        let line = import_archive(&archive, malformed.to_str().unwrap()).await;
        assert!(line.starts_with("تعذّر الاستيراد"), "got: {}", line);
        assert!(archive.is_empty());
    }

    #[test]
    fn test_format_time_12() {
        let morning = Local.with_ymd_and_hms(2025, 3, 1, 9, 5, 0).unwrap();
        assert_eq!(format_time_12(morning.timestamp_millis()), "9:05 ص");
        let noon = Local.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(format_time_12(noon.timestamp_millis()), "12:30 م");
        let midnight = Local.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(format_time_12(midnight.timestamp_millis()), "12:00 ص");
    }
}

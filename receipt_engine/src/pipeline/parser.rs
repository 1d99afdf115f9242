//! Heuristic extraction of payment facts from noisy recognized text. Receipts intermix the
//! fields we care about with bank branding, slogans and misread characters, so every field is
//! collected as a set of candidates first and the best candidate is chosen afterwards:
//! highest-confidence line first, then proximity to an anchor keyword.

use chrono::{NaiveDate, NaiveTime};
use log::trace;
use regex::Regex;
use rve_common::MoneyAmount;

use crate::{
    config::VerifyConfig,
    types::{ExtractedText, Field, ParsedFields},
};

/// Words that hint a line carries a transaction reference.
const REF_HINTS: [&str; 5] = ["операц", "номер", "чек", "transaction", "ref"];

pub struct FieldParser {
    amount_currency: Regex,
    amount_bare: Regex,
    date_dmy: Regex,
    date_ymd: Regex,
    time: Regex,
    txid: Regex,
    merchant: Regex,
    anchors: Vec<String>,
    aliases: Vec<String>,
}

struct Candidate<T> {
    value: T,
    currency: Option<String>,
    line_confidence: f32,
    anchor_distance: usize,
    strength: f32,
}

impl FieldParser {
    pub fn new(config: &VerifyConfig) -> Self {
        Self {
            amount_currency: Regex::new(r"(?i)(\d[\d\s]*(?:[.,]\d{1,2})?)\s*(₽|руб\.?|rub|р\.|\$|usd|€|eur)")
                .unwrap(),
            amount_bare: Regex::new(r"\b\d{1,3}(?:\s\d{3})*[.,]\d{2}\b|\b\d+[.,]\d{2}\b").unwrap(),
            date_dmy: Regex::new(r"\b(\d{2})[./-](\d{2})[./-](\d{4})\b").unwrap(),
            date_ymd: Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap(),
            time: Regex::new(r"\b(\d{1,2}):(\d{2})(?::(\d{2}))?\b").unwrap(),
            txid: Regex::new(r"\b[0-9A-Za-z][0-9A-Za-z-]{7,31}\b").unwrap(),
            merchant: Regex::new(r"(?i)\b(?:ИП|Индивидуальный предприниматель)\s+[А-ЯЁа-яё][А-ЯЁа-яё.\s]*")
                .unwrap(),
            anchors: config.anchor_keywords.clone(),
            aliases: config.merchant_aliases.clone(),
        }
    }

    /// Pure transform from recognized text to structured payment facts. Fields with no
    /// candidate stay absent.
    pub fn parse(&self, text: &ExtractedText) -> ParsedFields {
        let anchor_lines: Vec<usize> = text
            .lines
            .iter()
            .enumerate()
            .filter(|(_, l)| {
                let lower = l.text.to_lowercase();
                self.anchors.iter().any(|a| lower.contains(a))
            })
            .map(|(i, _)| i)
            .collect();
        let anchor_distance =
            |i: usize| anchor_lines.iter().map(|a| a.abs_diff(i)).min().unwrap_or(usize::MAX);

        let mut amounts = Vec::new();
        let mut dates = Vec::new();
        let mut times = Vec::new();
        let mut txids = Vec::new();
        let mut recipients = Vec::new();

        for (i, line) in text.lines.iter().enumerate() {
            let repaired = repair_line(&line.text);
            let dist = anchor_distance(i);
            let on_anchor_line = anchor_lines.contains(&i);
            self.collect_amounts(&repaired, line.confidence, dist, on_anchor_line, &mut amounts);
            self.collect_dates(&repaired, line.confidence, dist, &mut dates);
            self.collect_times(&repaired, line.confidence, dist, &mut times);
            self.collect_txids(&line.text, line.confidence, dist, &mut txids);
            self.collect_recipients(&line.text, line.confidence, dist, &mut recipients);
        }
        trace!(
            "🧾 Parsed candidates: {} amounts, {} dates, {} txids, {} recipients",
            amounts.len(),
            dates.len(),
            txids.len(),
            recipients.len()
        );

        let amount = best(amounts);
        let currency = amount.as_ref().and_then(|c| c.currency.clone());
        ParsedFields {
            amount: amount.map(into_field),
            currency,
            paid_date: best(dates).map(into_field),
            paid_time: best(times).map(into_field),
            txid: best(txids).map(into_field),
            recipient: best(recipients).map(into_field),
        }
    }

    fn collect_amounts(
        &self,
        line: &str,
        confidence: f32,
        anchor_distance: usize,
        on_anchor_line: bool,
        out: &mut Vec<Candidate<MoneyAmount>>,
    ) {
        // Spans already claimed by a date must not be re-read as amounts ("02.03" is not
        // 2 rubles 3 kopecks).
        let date_spans: Vec<(usize, usize)> = self
            .date_dmy
            .find_iter(line)
            .chain(self.date_ymd.find_iter(line))
            .map(|m| (m.start(), m.end()))
            .collect();
        let in_date = |start: usize, end: usize| date_spans.iter().any(|(s, e)| start < *e && end > *s);

        for caps in self.amount_currency.captures_iter(line) {
            let m = caps.get(1).expect("amount group");
            if in_date(m.start(), m.end()) {
                continue;
            }
            if let Some(value) = parse_money(m.as_str()) {
                let currency = currency_code(caps.get(2).expect("currency group").as_str());
                out.push(Candidate {
                    value,
                    currency: Some(currency),
                    line_confidence: confidence,
                    anchor_distance,
                    strength: 1.0,
                });
            }
        }
        for m in self.amount_bare.find_iter(line) {
            if in_date(m.start(), m.end()) {
                continue;
            }
            if let Some(value) = parse_money(m.as_str()) {
                out.push(Candidate {
                    value,
                    currency: None,
                    line_confidence: confidence,
                    anchor_distance,
                    strength: if on_anchor_line { 0.8 } else { 0.5 },
                });
            }
        }
    }

    fn collect_dates(&self, line: &str, confidence: f32, anchor_distance: usize, out: &mut Vec<Candidate<NaiveDate>>) {
        for caps in self.date_dmy.captures_iter(line) {
            let (d, m, y) = (caps[1].parse(), caps[2].parse(), caps[3].parse());
            if let (Ok(d), Ok(m), Ok(y)) = (d, m, y) {
                if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                    out.push(Candidate {
                        value: date,
                        currency: None,
                        line_confidence: confidence,
                        anchor_distance,
                        strength: 0.9,
                    });
                }
            }
        }
        for caps in self.date_ymd.captures_iter(line) {
            let (y, m, d) = (caps[1].parse(), caps[2].parse(), caps[3].parse());
            if let (Ok(y), Ok(m), Ok(d)) = (y, m, d) {
                if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                    out.push(Candidate {
                        value: date,
                        currency: None,
                        line_confidence: confidence,
                        anchor_distance,
                        strength: 0.9,
                    });
                }
            }
        }
    }

    fn collect_times(&self, line: &str, confidence: f32, anchor_distance: usize, out: &mut Vec<Candidate<NaiveTime>>) {
        for caps in self.time.captures_iter(line) {
            let h: u32 = match caps[1].parse() {
                Ok(h) => h,
                Err(_) => continue,
            };
            let m: u32 = match caps[2].parse() {
                Ok(m) => m,
                Err(_) => continue,
            };
            let s: u32 = caps.get(3).and_then(|s| s.as_str().parse().ok()).unwrap_or(0);
            if let Some(time) = NaiveTime::from_hms_opt(h, m, s) {
                out.push(Candidate {
                    value: time,
                    currency: None,
                    line_confidence: confidence,
                    anchor_distance,
                    strength: 0.9,
                });
            }
        }
    }

    fn collect_txids(&self, line: &str, confidence: f32, anchor_distance: usize, out: &mut Vec<Candidate<String>>) {
        let lower = line.to_lowercase();
        let hinted = REF_HINTS.iter().any(|h| lower.contains(h));
        for m in self.txid.find_iter(line) {
            let token = m.as_str();
            // A reference must carry at least one digit, and date/time shapes are not ids.
            if !token.chars().any(|c| c.is_ascii_digit()) {
                continue;
            }
            if self.date_dmy.is_match(token) || self.date_ymd.is_match(token) || self.time.is_match(token) {
                continue;
            }
            out.push(Candidate {
                value: token.to_string(),
                currency: None,
                line_confidence: confidence,
                anchor_distance,
                strength: if hinted { 0.9 } else { 0.6 },
            });
        }
    }

    fn collect_recipients(
        &self,
        line: &str,
        confidence: f32,
        anchor_distance: usize,
        out: &mut Vec<Candidate<String>>,
    ) {
        let lower = line.to_lowercase();
        if self.aliases.iter().any(|a| lower.contains(a)) {
            out.push(Candidate {
                value: line.trim().to_string(),
                currency: None,
                line_confidence: confidence,
                anchor_distance,
                strength: 1.0,
            });
            return;
        }
        if let Some(m) = self.merchant.find(line) {
            out.push(Candidate {
                value: m.as_str().trim().to_string(),
                currency: None,
                line_confidence: confidence,
                anchor_distance,
                strength: 0.7,
            });
        }
    }
}

/// Chooses a winner among candidates: highest-confidence line first, then closest to an anchor
/// keyword, then the stronger pattern.
fn best<T>(mut candidates: Vec<Candidate<T>>) -> Option<Candidate<T>> {
    use std::cmp::Ordering;
    candidates.sort_by(|a, b| {
        b.line_confidence
            .partial_cmp(&a.line_confidence)
            .unwrap_or(Ordering::Equal)
            .then(a.anchor_distance.cmp(&b.anchor_distance))
            .then(b.strength.partial_cmp(&a.strength).unwrap_or(Ordering::Equal))
    });
    candidates.into_iter().next()
}

fn into_field<T>(c: Candidate<T>) -> Field<T> {
    Field::new(c.value, c.line_confidence * c.strength)
}

/// Undoes the classic digit/letter confusions (O↔0, l↔1, S↔5, B↔8, Z↔2), but only inside
/// tokens that read as numbers afterwards, so words and references are left alone.
fn repair_line(line: &str) -> String {
    line.split_whitespace().map(repair_token).collect::<Vec<_>>().join(" ")
}

fn repair_token(token: &str) -> String {
    if !token.chars().any(|c| c.is_ascii_digit()) {
        return token.to_string();
    }
    let mapped: String = token
        .chars()
        .map(|c| match c {
            'O' | 'o' | 'О' | 'о' => '0',
            'l' | 'I' | '|' => '1',
            'Z' => '2',
            'S' | 's' => '5',
            'B' => '8',
            _ => c,
        })
        .collect();
    let numeric_shape =
        mapped.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | ':' | '-' | '/' | '₽'));
    if numeric_shape {
        mapped
    } else {
        token.to_string()
    }
}

/// Parses a human-formatted amount ("1 500,00", "999.99", "1.234.567,89") into minor units.
/// The trailing one-or-two digit group after the last separator is the kopeck part; every
/// other separator is grouping noise.
fn parse_money(raw: &str) -> Option<MoneyAmount> {
    let cleaned: String = raw.trim().chars().filter(|c| !c.is_whitespace()).collect();
    let (int_part, frac_part) = match cleaned.rfind(|c| c == '.' || c == ',') {
        Some(pos) if (1..=2).contains(&(cleaned.len() - pos - 1)) => (&cleaned[..pos], &cleaned[pos + 1..]),
        _ => (cleaned.as_str(), ""),
    };
    let int_digits: String = int_part.chars().filter(|c| c.is_ascii_digit()).collect();
    if int_digits.is_empty() || int_digits.len() > 12 {
        return None;
    }
    let rubles: i64 = int_digits.parse().ok()?;
    let kopecks: i64 = match frac_part.len() {
        0 => 0,
        1 => frac_part.parse::<i64>().ok()? * 10,
        2 => frac_part.parse().ok()?,
        _ => return None,
    };
    Some(MoneyAmount::from(rubles * 100 + kopecks))
}

fn currency_code(token: &str) -> String {
    let lower = token.to_lowercase();
    if lower.starts_with('₽') || lower.starts_with("руб") || lower.starts_with("rub") || lower.starts_with('р') {
        "RUB".to_string()
    } else if lower.starts_with('$') || lower.starts_with("usd") {
        "USD".to_string()
    } else if lower.starts_with('€') || lower.starts_with("eur") {
        "EUR".to_string()
    } else {
        lower.to_uppercase()
    }
}

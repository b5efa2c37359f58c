//! Table output for command results.

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Table};
use fxdesk_engine::{Portfolio, TradeReceipt, TradeSide, Valuation};
use fxdesk_fx::{CachedQuote, RefreshReport};
use fxdesk_ledger::HistoryRecord;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(header);
    table
}

pub fn receipt(receipt: &TradeReceipt, base: &str) -> String {
    let verb = match receipt.side {
        TradeSide::Buy => "Bought",
        TradeSide::Sell => "Sold",
    };
    let mut out = format!(
        "{} {} {} at {} ({} {} {})\n",
        verb,
        receipt.amount,
        receipt.currency,
        receipt.quote.rate,
        if receipt.base_delta.is_sign_negative() { "paid" } else { "received" },
        receipt.base_delta.abs(),
        base,
    );
    out.push_str(&holdings(&receipt.balances_after).to_string());
    out
}

pub fn holdings(portfolio: &Portfolio) -> Table {
    let mut table = table(vec!["Currency", "Amount"]);
    for (code, amount) in &portfolio.holdings {
        table.add_row(vec![Cell::new(code), Cell::new(amount)]);
    }
    table
}

pub fn valuation(valuation: &Valuation) -> String {
    let value_header = format!("Value ({})", valuation.currency);
    let mut table = table(vec!["Currency", "Amount", "Rate", value_header.as_str()]);
    for line in &valuation.lines {
        let rate = match (line.rate, line.stale) {
            (Some(rate), true) => format!("{} (stale)", rate),
            (Some(rate), false) => rate.to_string(),
            (None, _) => "n/a".to_string(),
        };
        let value = line
            .value
            .map(|v| v.round_dp(2).to_string())
            .unwrap_or_else(|| "n/a".to_string());
        table.add_row(vec![
            Cell::new(&line.currency),
            Cell::new(line.amount),
            Cell::new(rate),
            Cell::new(value),
        ]);
    }

    let mut out = format!("{table}\nTotal: {} {}", valuation.total.round_dp(2), valuation.currency);
    let unpriced = valuation.unpriced().count();
    if unpriced > 0 {
        out.push_str(&format!(" ({} holding(s) without a rate)", unpriced));
    }
    out
}

pub fn refresh_report(report: &RefreshReport) -> String {
    let mut table = table(vec!["Pair", "Status", "Rate", "Source"]);
    for (pair, outcome) in &report.outcomes {
        match outcome {
            Ok(quote) => table.add_row(vec![
                Cell::new(pair),
                Cell::new("OK"),
                Cell::new(quote.rate),
                Cell::new(&quote.source),
            ]),
            Err(e) => table.add_row(vec![
                Cell::new(pair),
                Cell::new("FAILED"),
                Cell::new("-"),
                Cell::new(e),
            ]),
        };
    }
    format!(
        "{table}\nUpdated {} pair(s), {} failed",
        report.success_count(),
        report.failure_count()
    )
}

pub fn rates(rates: &[CachedQuote]) -> String {
    if rates.is_empty() {
        return "No cached rates; run `update-rates` first".to_string();
    }
    let mut table = table(vec!["Pair", "Rate", "Source", "Observed", "Expires", "State"]);
    for cached in rates {
        table.add_row(vec![
            Cell::new(cached.quote.pair.key()),
            Cell::new(cached.quote.rate),
            Cell::new(&cached.quote.source),
            Cell::new(cached.quote.observed_at.format(TIME_FORMAT)),
            Cell::new(cached.expires_at.format(TIME_FORMAT)),
            Cell::new(if cached.is_stale() { "stale" } else { "fresh" }),
        ]);
    }
    table.to_string()
}

pub fn history(records: &[HistoryRecord]) -> String {
    if records.is_empty() {
        return "No history records".to_string();
    }
    let mut table = table(vec!["Id", "Pair", "Rate", "Source", "Observed"]);
    for record in records {
        table.add_row(vec![
            Cell::new(&record.id),
            Cell::new(&record.pair),
            Cell::new(record.rate),
            Cell::new(&record.source),
            Cell::new(record.observed_at.format(TIME_FORMAT)),
        ]);
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fxdesk_common::{Currency, CurrencyPair, Quote};
    use fxdesk_engine::ValuationLine;
    use fxdesk_fx::FxError;
    use rust_decimal_macros::dec;

    fn quote() -> Quote {
        Quote::new(
            CurrencyPair::new(Currency::btc(), Currency::usd()),
            dec!(50000),
            "coingecko",
            Utc.with_ymd_and_hms(2026, 1, 10, 15, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_valuation_marks_stale_and_missing() {
        let valuation = Valuation {
            currency: "USD".into(),
            lines: vec![
                ValuationLine {
                    currency: "BTC".into(),
                    amount: dec!(0.5),
                    rate: Some(dec!(50000)),
                    value: Some(dec!(25000)),
                    stale: true,
                },
                ValuationLine {
                    currency: "SOL".into(),
                    amount: dec!(3),
                    rate: None,
                    value: None,
                    stale: false,
                },
            ],
            total: dec!(25000),
        };

        let out = super::valuation(&valuation);

        assert!(out.contains("50000 (stale)"));
        assert!(out.contains("n/a"));
        assert!(out.contains("Total: 25000 USD (1 holding(s) without a rate)"));
    }

    #[test]
    fn test_refresh_report_lists_failures() {
        let mut report = RefreshReport::default();
        report.outcomes.insert("BTC_USD".into(), Ok(quote()));
        report.outcomes.insert(
            "SOL_USD".into(),
            Err(FxError::UnknownSource("nobody".into())),
        );

        let out = refresh_report(&report);

        assert!(out.contains("BTC_USD"));
        assert!(out.contains("FAILED"));
        assert!(out.ends_with("Updated 1 pair(s), 1 failed"));
    }

    #[test]
    fn test_empty_listings() {
        assert!(rates(&[]).contains("update-rates"));
        assert_eq!(history(&[]), "No history records");
    }

    #[test]
    fn test_history_rows() {
        let record = HistoryRecord::from_quote(&quote());
        let out = history(&[record]);
        assert!(out.contains("BTCUSD_20260110T150000Z"));
        assert!(out.contains("2026-01-10 15:00:00 UTC"));
    }
}

use rust_decimal::Decimal;

use crate::source::types::ValueSnapshot;

/// Pure formatter from a snapshot to outbound text. Swappable.
pub type Renderer = fn(&ValueSnapshot) -> String;

pub const FETCH_FAILED: &str = "⚠️ Gagal ambil harga realtime. Coba lagi sebentar ya.";
pub const SUBSCRIBED: &str = "🔔 Kamu berlangganan update harga emas. Ketik *berhenti* untuk berhenti.";
pub const UNSUBSCRIBED: &str = "🔕 Langganan update harga emas dihentikan.";

pub fn help_text() -> String {
    [
        "Perintah:",
        "• emas — harga emas realtime",
        "• langganan — kirim update otomatis saat harga berubah",
        "• berhenti — hentikan update otomatis",
    ]
    .join("\n")
}

/// "Rp 1.935.000": whole rupiah with `.` as thousands separator.
pub fn rupiah(amount: Decimal) -> String {
    let rounded = amount.round_dp(0);
    let digits = rounded.abs().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("Rp -{grouped}")
    } else {
        format!("Rp {grouped}")
    }
}

/// Gold-rate message: buy, sell, spread and upstream update time.
pub fn render_gold_rate(snapshot: &ValueSnapshot) -> String {
    let buy = snapshot.primary;
    let sell = snapshot.secondary;
    let diff = (buy - sell).abs();
    let spread_pct = if buy.is_zero() {
        Decimal::ZERO
    } else {
        (diff / buy * Decimal::ONE_HUNDRED).round_dp(2)
    };
    let updated = snapshot.source_time.as_deref().unwrap_or("-");

    [
        "💰 Harga Emas Treasury (per gram)".to_string(),
        format!("• Beli   : {}", rupiah(buy)),
        format!("• Jual   : {}", rupiah(sell)),
        format!("• Selisih: {} (Spread {:.2}%)", rupiah(diff), spread_pct),
        format!("• Update : {updated} (WIB)"),
    ]
    .join("\n")
}

//! Fixed host lines.

pub const GREETING: &str = "Moin! Ich bin Toni. Drück den Knopf und sag was.";
pub const LISTENING: &str = "Ich hör zu...";
pub const NOT_UNDERSTOOD: &str = "Ich hab nix verstanden. Versuch's nochmal!";
pub const MIC_DENIED: &str = "Ich brauch Mikrofon-Zugriff, sonst bin ich taub!";
pub const FAREWELL: &str = "Feierabend! Kommt gut heim.";

/// One-line status for the console, listening taking precedence.
pub fn status_line(listening: bool, processing: bool, speaking: bool) -> &'static str {
    if listening {
        "HÖRT ZU..."
    } else if processing {
        "TONI DENKT..."
    } else if speaking {
        "TONI SPRICHT"
    } else {
        "BEREIT"
    }
}

//! Shared UI icons.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static SKIPPED: Emoji<'_, '_> = Emoji("⏸️  ", "[--]");

// Pipeline indicators
pub static DEGRADED: Emoji<'_, '_> = Emoji("🧪 ", "[MOCK]");
pub static REPORT: Emoji<'_, '_> = Emoji("📄 ", "[REPORT]");
pub static PROGRESS: Emoji<'_, '_> = Emoji("📊 ", "[PROG]");
pub static RESUME: Emoji<'_, '_> = Emoji("🔄 ", "[RESUME]");

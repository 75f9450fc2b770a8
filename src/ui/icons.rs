//! Shared UI icons.
//!
//! Each icon has a plain-text fallback for terminals without emoji support.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!]");

// Orchestration status
pub static IDLE: Emoji<'_, '_> = Emoji("💤 ", "[idle]");
pub static THINKING: Emoji<'_, '_> = Emoji("💭 ", "[think]");
pub static TOOL: Emoji<'_, '_> = Emoji("🔧 ", "[tool]");
pub static WAITING: Emoji<'_, '_> = Emoji("⏸️  ", "[wait]");

// Timeline
pub static PHASE: Emoji<'_, '_> = Emoji("▶️  ", ">");
pub static SOUNDINGS: Emoji<'_, '_> = Emoji("🔱 ", "[S]");
pub static REFORGE: Emoji<'_, '_> = Emoji("🔁 ", "[R]");
pub static WINNER: Emoji<'_, '_> = Emoji("🏆 ", "*");
pub static COST: Emoji<'_, '_> = Emoji("💰 ", "$");

// Lineage
pub static BRANCH: Emoji<'_, '_> = Emoji("🌿 ", "+-");
pub static CHECKPOINT: Emoji<'_, '_> = Emoji("📍 ", "@");

/*
 * Responsibility
 * - middleware の公開インターフェース
 * - 適用順 (外側から): http -> preflight -> cors -> routes
 */
pub mod cors;
pub mod http;
pub mod preflight;

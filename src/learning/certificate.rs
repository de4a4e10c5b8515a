//! Certificate issuance and rendering.
//!
//! Issuance is an idempotent insert keyed on (user, course). The
//! rendered certificate is a fixed 800×600 layout, produced both as an
//! HTML view and as a downloadable PNG.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use rusqlite::params;
use rusqlite::OptionalExtension;
use rusttype::{Font, Scale};

use crate::db::models::Certificate;
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

const WIDTH: u32 = 800;
const HEIGHT: u32 = 600;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const GOLD: Rgba<u8> = Rgba([212, 175, 55, 255]);
const INK: Rgba<u8> = Rgba([26, 26, 26, 255]);
const MUTED: Rgba<u8> = Rgba([85, 85, 85, 255]);

/// System font locations probed when no font is configured.
const FALLBACK_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

// -- Persistence --

/// Issue a certificate for a completed course. Idempotent on the
/// (user, course) unique key: repeated triggers keep the original row
/// and its issued_at.
pub fn issue(pool: &DbPool, user_id: &str, course_id: &str) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO certificates (id, user_id, course_id) VALUES (?1, ?2, ?3) \
         ON CONFLICT (user_id, course_id) DO NOTHING",
        params![uuid::Uuid::now_v7().to_string(), user_id, course_id],
    )?;
    Ok(())
}

pub fn find(pool: &DbPool, user_id: &str, course_id: &str) -> AppResult<Option<Certificate>> {
    let conn = pool.get()?;
    let cert = conn
        .query_row(
            "SELECT id, user_id, course_id, issued_at, approved, approved_by, approved_at \
             FROM certificates WHERE user_id = ?1 AND course_id = ?2",
            params![user_id, course_id],
            Certificate::from_row,
        )
        .optional()?;
    Ok(cert)
}

/// Approve a certificate, recording the approving admin and timestamp.
pub fn approve(pool: &DbPool, certificate_id: &str, admin_id: &str) -> AppResult<()> {
    let conn = pool.get()?;
    let updated = conn.execute(
        "UPDATE certificates \
         SET approved = 1, approved_by = ?2, approved_at = datetime('now') \
         WHERE id = ?1",
        params![certificate_id, admin_id],
    )?;
    if updated == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

/// Reject a certificate by deleting it outright.
pub fn reject(pool: &DbPool, certificate_id: &str) -> AppResult<()> {
    let conn = pool.get()?;
    let deleted = conn.execute(
        "DELETE FROM certificates WHERE id = ?1",
        params![certificate_id],
    )?;
    if deleted == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

/// Certificate joined with recipient and course for the admin list.
#[derive(Debug, Clone)]
pub struct CertificateListing {
    pub id: String,
    pub recipient: String,
    pub email: String,
    pub course_title: String,
    pub issued_at: String,
    pub approved: bool,
}

pub fn list_all(pool: &DbPool) -> AppResult<Vec<CertificateListing>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT c.id, COALESCE(u.full_name, u.email), u.email, co.title, c.issued_at, c.approved \
         FROM certificates c \
         JOIN users u ON u.id = c.user_id \
         JOIN courses co ON co.id = c.course_id \
         ORDER BY c.issued_at DESC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(CertificateListing {
                id: row.get(0)?,
                recipient: row.get(1)?,
                email: row.get(2)?,
                course_title: row.get(3)?,
                issued_at: row.get(4)?,
                approved: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// -- Rendering --

/// Everything the fixed layout prints.
pub struct CertificateArt<'a> {
    pub recipient: &'a str,
    pub course_title: &'a str,
    pub issued_on: &'a str,
    pub organization: &'a str,
}

/// Download filename: recipient name with whitespace runs collapsed to
/// underscores.
pub fn download_filename(recipient: &str) -> String {
    let name = recipient
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    format!("{}_Certificate.png", name)
}

/// Format a stored `datetime('now')` timestamp as a human issue date.
/// Falls back to the raw string for anything unparseable.
pub fn format_issue_date(issued_at: &str) -> String {
    chrono::NaiveDateTime::parse_from_str(issued_at, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.format("%B %-d, %Y").to_string())
        .unwrap_or_else(|_| issued_at.to_string())
}

fn load_font(configured: Option<&Path>) -> Option<Font<'static>> {
    let candidates: Vec<PathBuf> = configured
        .map(Path::to_path_buf)
        .into_iter()
        .chain(FALLBACK_FONTS.iter().map(PathBuf::from))
        .collect();

    for path in candidates {
        if let Ok(data) = std::fs::read(&path) {
            if let Some(font) = Font::try_from_vec(data) {
                tracing::debug!("Certificate font: {}", path.display());
                return Some(font);
            }
        }
    }
    None
}

fn draw_centered(img: &mut RgbaImage, font: &Font, scale: Scale, y: i32, color: Rgba<u8>, text: &str) {
    let (w, _) = text_size(scale, font, text);
    let x = (WIDTH as i32 - w) / 2;
    draw_text_mut(img, color, x, y, scale, font, text);
}

/// Render the PNG certificate. Returns `Ok(None)` when no usable font
/// can be found — the caller surfaces a message instead of failing.
pub fn render_png(
    art: &CertificateArt,
    font_path: Option<&Path>,
) -> AppResult<Option<Vec<u8>>> {
    let Some(font) = load_font(font_path) else {
        tracing::warn!("No TTF font available; skipping certificate rendering");
        return Ok(None);
    };
    let png = render_with_font(art, &font)?;
    Ok(Some(png))
}

fn render_with_font(art: &CertificateArt, font: &Font) -> AppResult<Vec<u8>> {
    let mut img = RgbaImage::new(WIDTH, HEIGHT);

    // White ground with an 8px gold border inset by 20
    draw_filled_rect_mut(
        &mut img,
        Rect::at(0, 0).of_size(WIDTH, HEIGHT),
        WHITE,
    );
    for i in 0..8 {
        draw_hollow_rect_mut(
            &mut img,
            Rect::at(20 + i, 20 + i).of_size(WIDTH - 40 - 2 * i as u32, HEIGHT - 40 - 2 * i as u32),
            GOLD,
        );
    }

    draw_centered(&mut img, font, Scale::uniform(36.0), 90, INK, "CERTIFICATE OF COMPLETION");

    // Decorative rule under the title
    draw_filled_rect_mut(&mut img, Rect::at(200, 140).of_size(400, 2), GOLD);

    draw_centered(&mut img, font, Scale::uniform(20.0), 185, MUTED, "This is to certify that");
    draw_centered(&mut img, font, Scale::uniform(28.0), 220, INK, art.recipient);
    draw_centered(
        &mut img,
        font,
        Scale::uniform(20.0),
        270,
        MUTED,
        "has successfully completed the",
    );
    draw_centered(&mut img, font, Scale::uniform(24.0), 305, INK, art.course_title);

    let completed = format!("Completed on {}", art.issued_on);
    draw_centered(&mut img, font, Scale::uniform(18.0), 390, MUTED, &completed);

    draw_centered(&mut img, font, Scale::uniform(20.0), 465, GOLD, art.organization);

    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut buf, image::ImageOutputFormat::Png)
        .map_err(|e| AppError::Internal(format!("PNG encode failed: {}", e)))?;
    Ok(buf.into_inner())
}

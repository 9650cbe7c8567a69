//! Keyword registry commands

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use surge_core::{slugify, Database};

pub fn cmd_keywords_list(db: &Database, geo: Option<&str>) -> Result<()> {
    let keywords = db.list_keywords(geo)?;
    if keywords.is_empty() {
        println!("No keywords registered. Add one with 'surge keywords add'.");
        return Ok(());
    }

    println!("📋 Keywords");
    println!("   ─────────────────────────────");
    for kw in keywords {
        println!(
            "   [{}] {}{} - group '{}' (slug {}), geo {}, category {}{}",
            kw.id,
            kw.keyword,
            if kw.is_anchor { " ⚓" } else { "" },
            kw.group_name,
            slugify(&kw.group_name),
            kw.geo,
            kw.category,
            if kw.is_active { "" } else { " [inactive]" },
        );
    }

    Ok(())
}

pub fn cmd_keywords_add(
    db: &Database,
    keyword: &str,
    group: &str,
    geo: &str,
    category: u32,
    anchor: bool,
) -> Result<()> {
    let id = db
        .upsert_keyword(keyword, group, geo, category, anchor)
        .context("Failed to add keyword")?;

    println!(
        "✅ Keyword '{}' registered (id {}) under group '{}' (slug {})",
        keyword,
        id,
        group,
        slugify(group)
    );
    Ok(())
}

pub fn cmd_keywords_deactivate(db: &Database, keyword: &str, geo: &str, category: u32) -> Result<()> {
    if db.deactivate_keyword(keyword, geo, category)? {
        println!("✅ Keyword '{}' deactivated", keyword);
    } else {
        println!("No keyword '{}' for geo {} category {}", keyword, geo, category);
    }
    Ok(())
}

pub fn cmd_keywords_import(db: &Database, file: &Path) -> Result<()> {
    let reader = File::open(file)
        .with_context(|| format!("Failed to open {}", file.display()))?;
    let imported = db
        .import_keywords_csv(reader)
        .context("Failed to import keywords")?;

    println!("✅ Imported {} keywords from {}", imported, file.display());
    Ok(())
}

//! Text and JSON rendering of the views.
//!
//! This module turns search results, school pages and submission outcomes
//! into terminal output.

use crate::models::{AggregateRating, Category, Institution, Review};
use crate::ratings::{filled_stars, rating_distribution};
use crate::submission::Submitted;
use crate::views::{SchoolPage, SearchResults};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

const NOT_AVAILABLE: &str = "N/A";

/// Draw a five-star bar for an average.
fn star_bar(average: Option<f64>) -> String {
    let filled = average.map(filled_stars).unwrap_or(0);
    format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
}

fn format_average(average: Option<f64>) -> String {
    average
        .map(|a| format!("{:.1}", a))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// "Posted 8 months ago" style age.
pub fn relative_age(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(created_at);
    let days = age.num_days();

    let (amount, unit) = if age.num_minutes() < 1 {
        return "Posted just now".to_string();
    } else if age.num_hours() < 1 {
        (age.num_minutes(), "minute")
    } else if days < 1 {
        (age.num_hours(), "hour")
    } else if days < 30 {
        (days, "day")
    } else if days < 365 {
        (days / 30, "month")
    } else {
        (days / 365, "year")
    };

    let plural = if amount == 1 { "" } else { "s" };
    format!("Posted {} {}{} ago", amount, unit, plural)
}

/// Generate the search results listing.
pub fn generate_search_text(results: &SearchResults) -> String {
    if results.no_results {
        return format!("No results found for \"{}\".\n", results.query);
    }

    let mut output = String::new();
    output.push_str(&format!(
        "Found {} school(s) matching \"{}\":\n\n",
        results.institutions.len(),
        results.query
    ));
    for institution in &results.institutions {
        output.push_str(&generate_institution_line(institution));
    }
    output
}

/// Generate the "all schools" listing.
pub fn generate_institutions_text(institutions: &[Institution]) -> String {
    if institutions.is_empty() {
        return "No schools available yet.\n".to_string();
    }

    institutions
        .iter()
        .map(generate_institution_line)
        .collect()
}

fn generate_institution_line(institution: &Institution) -> String {
    let mut line = format!("  [{}] {}", institution.id, institution.name);
    if !institution.location.is_empty() {
        line.push_str(&format!(" ({})", institution.location));
    }
    if let Some(count) = institution.total_reviews {
        line.push_str(&format!(" - {} reviews", count));
    }
    if let Some(rating) = institution.overall_rating {
        line.push_str(&format!(" - {:.1}★", rating));
    }
    line.push('\n');
    line
}

/// Generate a complete school page.
pub fn generate_school_text(page: &SchoolPage, max_reviews: usize, now: DateTime<Utc>) -> String {
    let mut output = String::new();

    output.push_str(&format!("# {}\n", page.institution.name));
    if !page.institution.location.is_empty() {
        output.push_str(&format!("{}\n", page.institution.location));
    }
    output.push('\n');

    output.push_str(&generate_rating_section(&page.aggregate, &page.reviews));
    output.push_str(&generate_reviews_section(&page.reviews, max_reviews, now));

    output
}

/// Overall score plus the per-category breakdown.
fn generate_rating_section(aggregate: &AggregateRating, reviews: &[Review]) -> String {
    let mut section = String::new();

    section.push_str("## Overall Rating\n\n");
    section.push_str(&format!(
        "  {} {}\n\n",
        star_bar(aggregate.overall),
        format_average(aggregate.overall)
    ));
    if !aggregate.is_available() {
        section.push_str("  Not rated yet.\n\n");
        return section;
    }

    section.push_str("## Rating Breakdown\n\n");
    for category in Category::ALL {
        let average = aggregate.category(category);
        let counts = rating_distribution(reviews, category);
        section.push_str(&format!(
            "  {:<18} {} {:>4}   [{}]\n",
            category.label(),
            star_bar(average),
            format_average(average),
            counts
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{}★:{}", i + 1, c))
                .collect::<Vec<_>>()
                .join(" ")
        ));
    }
    section.push('\n');

    section
}

fn generate_reviews_section(reviews: &[Review], max_reviews: usize, now: DateTime<Utc>) -> String {
    let mut section = String::new();

    section.push_str(&format!("## Browse {} Reviews\n\n", reviews.len()));
    if reviews.is_empty() {
        section.push_str("  No reviews yet. Be the first to write one!\n");
        return section;
    }

    for review in reviews.iter().take(max_reviews) {
        section.push_str(&generate_review_block(review, now));
    }
    if reviews.len() > max_reviews {
        section.push_str(&format!("  ... and {} more\n", reviews.len() - max_reviews));
    }

    section
}

/// Generate a single review block.
fn generate_review_block(review: &Review, now: DateTime<Utc>) -> String {
    let mut block = String::new();

    block.push_str(&format!(
        "  {} · {} · {}\n",
        review.display_author(),
        format_average(review.overall),
        relative_age(review.created_at, now)
    ));
    block.push_str(&format!("  {}\n", review.comment));

    let breakdown: Vec<String> = Category::ALL
        .iter()
        .map(|c| {
            let value = review
                .ratings
                .get(*c)
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string());
            format!("{}: {}", c.label(), value)
        })
        .collect();
    block.push_str(&format!("  {}\n\n", breakdown.join(" | ")));

    block
}

/// Confirmation printed after a successful submission.
pub fn generate_submission_text(submitted: &Submitted, page: &SchoolPage) -> String {
    format!(
        "Review {} for {} (your overall rating: {}).\nSchool overall is now {} across {} review(s).\n",
        submitted.disposition,
        page.institution.name,
        format_average(submitted.review.overall),
        format_average(page.aggregate.overall),
        page.aggregate.review_count
    )
}

/// Generate a JSON rendering of any view.
pub fn generate_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(Into::into)
}

use std::collections::BTreeSet;
use std::fmt::Write;
use survivor_league::UserScoreBreakdown;

#[derive(Debug, Clone)]
pub struct StandingsRow {
    pub display_name: String,
    pub breakdown: UserScoreBreakdown,
}

#[derive(Debug, Clone, Default)]
pub struct StandingsTable {
    pub season: String,
    pub rows: Vec<StandingsRow>,
}

/// Render the standings as a plain-text table: legacy buckets first, then
/// one column per custom column id, the season tracks, and the total.
pub fn render(table: &StandingsTable) -> String {
    let mut columns: BTreeSet<&str> = BTreeSet::new();
    for row in &table.rows {
        columns.extend(row.breakdown.category_points_by_column_id.keys().map(String::as_str));
    }

    let mut out = String::new();
    if table.season.is_empty() {
        out.push_str("League standings\n\n");
    } else {
        let _ = writeln!(out, "{} — standings\n", table.season);
    }

    let _ = write!(out, "{:>2}  {:<16} {:>3} {:>3} {:>3}", "#", "USER", "VO", "RM", "IM");
    for column in &columns {
        let _ = write!(out, " {column:>4}");
    }
    let _ = writeln!(out, " {:>3} {:>3} {:>3}  {:>5}", "MT", "F3", "WIN", "TOTAL");

    for (rank, row) in table.rows.iter().enumerate() {
        let b = &row.breakdown;
        let _ = write!(
            out,
            "{:>2}  {:<16} {:>3} {:>3} {:>3}",
            rank + 1,
            row.display_name,
            b.voted_out_points,
            b.remain_points,
            b.immunity_points,
        );
        for column in &columns {
            let _ = write!(out, " {:>4}", b.points_for_column(column));
        }
        let _ = writeln!(
            out,
            " {:>3} {:>3} {:>3}  {:>5}",
            b.merge_track_points,
            b.final_three_track_points,
            b.winner_points,
            b.total(),
        );
    }

    if table.rows.is_empty() {
        out.push_str("(no league members yet)\n");
    }
    out
}

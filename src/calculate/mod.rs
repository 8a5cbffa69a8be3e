//! Display statistics derived from cached matches.
//!
//! Computes per-player aggregates for the dashboard:
//! - KDA, CS and gold per minute, win rate and a coarse grade
//! - Per-champion win/loss tallies for roster players

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{MatchRecord, Participant};

/// Calculate win rate from wins and games played.
pub fn calculate_win_rate(wins: u32, games: u32) -> f64 {
    if games == 0 {
        0.0
    } else {
        wins as f64 / games as f64
    }
}

/// (kills + assists) / deaths, with deathless games counted as one death.
pub fn calculate_kda(kills: u32, deaths: u32, assists: u32) -> f64 {
    (kills + assists) as f64 / deaths.max(1) as f64
}

/// Per-minute rate over a number of seconds played.
pub fn per_minute(total: u32, seconds: u32) -> f64 {
    if seconds == 0 {
        0.0
    } else {
        total as f64 * 60.0 / seconds as f64
    }
}

/// Coarse letter grade from average KDA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    B,
    C,
    D,
}

impl Grade {
    pub fn from_kda(kda: f64) -> Self {
        if kda >= 5.0 {
            Grade::APlus
        } else if kda >= 3.0 {
            Grade::B
        } else if kda >= 2.0 {
            Grade::C
        } else {
            Grade::D
        }
    }
}

/// Aggregate line for one player across a set of matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub summoner_name: String,
    pub games: u32,
    pub wins: u32,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub kda: f64,
    pub cs_per_min: f64,
    pub gold_per_min: f64,
    pub win_rate: f64,
    pub grade: Grade,
}

/// Summarize every appearance of `game_name` in `records`.
pub fn summarize_player(records: &[MatchRecord], game_name: &str) -> PlayerSummary {
    let lines: Vec<&Participant> = records
        .iter()
        .flat_map(|r| r.info.participants.iter())
        .filter(|p| p.riot_id_game_name == game_name)
        .collect();

    let games = lines.len() as u32;
    let wins = lines.iter().filter(|p| p.win).count() as u32;
    let kills = lines.iter().map(|p| p.kills).sum();
    let deaths = lines.iter().map(|p| p.deaths).sum();
    let assists = lines.iter().map(|p| p.assists).sum();
    let cs = lines.iter().map(|p| p.creep_score()).sum();
    let gold = lines.iter().map(|p| p.gold_earned).sum();
    let seconds = lines.iter().map(|p| p.time_played).sum();

    let kda = calculate_kda(kills, deaths, assists);

    PlayerSummary {
        summoner_name: game_name.to_string(),
        games,
        wins,
        kills,
        deaths,
        assists,
        kda,
        cs_per_min: per_minute(cs, seconds),
        gold_per_min: per_minute(gold, seconds),
        win_rate: calculate_win_rate(wins, games),
        grade: Grade::from_kda(kda),
    }
}

/// Win/loss tally for one champion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChampionStats {
    pub wins: u32,
    pub total: u32,
}

impl ChampionStats {
    pub fn win_rate(&self) -> f64 {
        calculate_win_rate(self.wins, self.total)
    }
}

/// summoner name -> champion -> tally
pub type ChampionTable = BTreeMap<String, BTreeMap<String, ChampionStats>>;

/// Tally champions for every participant whose game name contains one of `names`.
pub fn champion_stats(records: &[MatchRecord], names: &[String]) -> ChampionTable {
    let mut table = ChampionTable::new();

    for p in records.iter().flat_map(|r| r.info.participants.iter()) {
        if !names.iter().any(|n| p.riot_id_game_name.contains(n.as_str())) {
            continue;
        }

        let entry = table
            .entry(p.riot_id_game_name.clone())
            .or_default()
            .entry(p.champion_name.clone())
            .or_default();
        entry.total += 1;
        if p.win {
            entry.wins += 1;
        }
    }

    table
}

/// Champion with the best win rate, preferring more games on ties.
pub fn best_champion(champions: &BTreeMap<String, ChampionStats>) -> Option<(&str, ChampionStats)> {
    champions
        .iter()
        .filter(|(_, s)| s.total > 0)
        .max_by(|(_, a), (_, b)| {
            a.win_rate()
                .total_cmp(&b.win_rate())
                .then_with(|| a.total.cmp(&b.total))
        })
        .map(|(name, stats)| (name.as_str(), *stats))
}

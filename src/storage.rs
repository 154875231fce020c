use anyhow::Result;
use rusqlite::{params, Connection};

use crate::record::TrialRow;
use crate::report::ScenarioSummary;

pub struct ResultStore {
    conn: Connection,
}

impl ResultStore {
    pub fn new(path: &str) -> Result<Self> {
        Ok(Self { conn: Connection::open(path)? })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn init(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS trials (
                run_id TEXT NOT NULL,
                test_id TEXT NOT NULL,
                repeat_idx INTEGER NOT NULL,
                mode TEXT NOT NULL,
                market TEXT NOT NULL,
                quality TEXT NOT NULL,
                seed INTEGER,
                p_off REAL,
                q_p REAL,
                p_res_s REAL,
                p_res_b REAL,
                p_0_s REAL,
                p_0_b REAL,
                offchain_time REAL NOT NULL,
                total_gas INTEGER NOT NULL,
                match_time REAL NOT NULL,
                match_success INTEGER NOT NULL,
                failure_reason TEXT NOT NULL,
                p_on REAL,
                pdr REAL,
                sdf REAL,
                ece REAL,
                error_stage TEXT
            );
            CREATE TABLE IF NOT EXISTS scenario_summary (
                run_id TEXT NOT NULL,
                scenario_id TEXT NOT NULL,
                mode TEXT NOT NULL,
                success_rate REAL NOT NULL,
                trials INTEGER NOT NULL,
                mean_pdr REAL,
                mean_sdf REAL,
                mean_ece REAL,
                mean_total_gas REAL NOT NULL,
                mean_match_time REAL NOT NULL
            );
            COMMIT;",
        )?;
        Ok(())
    }

    pub fn persist_trial(&mut self, run_id: &str, r: &TrialRow) -> Result<()> {
        self.conn.execute(
            "INSERT INTO trials (run_id, test_id, repeat_idx, mode, market, quality, seed, p_off, q_p,
                p_res_s, p_res_b, p_0_s, p_0_b, offchain_time, total_gas, match_time, match_success,
                failure_reason, p_on, pdr, sdf, ece, error_stage)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                ?18, ?19, ?20, ?21, ?22, ?23)",
            params![
                run_id,
                r.test_id,
                r.repeat_idx as i64,
                r.mode,
                r.market,
                r.quality,
                r.seed.map(|s| s as i64),
                r.p_off,
                r.q_p,
                r.p_res_s,
                r.p_res_b,
                r.p_0_s,
                r.p_0_b,
                r.offchain_time,
                r.total_gas as i64,
                r.match_time,
                r.match_success as i64,
                r.failure_reason,
                r.p_on,
                r.pdr,
                r.sdf,
                r.ece,
                r.error_stage,
            ],
        )?;
        Ok(())
    }

    pub fn persist_summary(&mut self, run_id: &str, summary: &[ScenarioSummary]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for s in summary {
            tx.execute(
                "INSERT INTO scenario_summary (run_id, scenario_id, mode, success_rate, trials,
                    mean_pdr, mean_sdf, mean_ece, mean_total_gas, mean_match_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    run_id,
                    s.scenario_id,
                    s.mode,
                    s.success_rate,
                    s.trials as i64,
                    s.mean_pdr,
                    s.mean_sdf,
                    s.mean_ece,
                    s.mean_total_gas,
                    s.mean_match_time
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Recompute the per-cell aggregate from stored rows. `AVG` skips NULLs,
    /// so unpriced trials drop out of the metric means as in `summarize`.
    pub fn aggregate(&self, run_id: &str) -> Result<Vec<ScenarioSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT test_id, mode, AVG(match_success), COUNT(*), AVG(pdr), AVG(sdf), AVG(ece),
                    AVG(total_gas), AVG(match_time)
             FROM trials WHERE run_id = ?1
             GROUP BY test_id, mode
             ORDER BY test_id, mode",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(ScenarioSummary {
                scenario_id: row.get(0)?,
                mode: row.get(1)?,
                success_rate: row.get(2)?,
                trials: row.get::<_, i64>(3)? as u32,
                mean_pdr: row.get(4)?,
                mean_sdf: row.get(5)?,
                mean_ece: row.get(6)?,
                mean_total_gas: row.get(7)?,
                mean_match_time: row.get(8)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn trial_count(&self, run_id: &str) -> Result<u64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM trials WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }
}

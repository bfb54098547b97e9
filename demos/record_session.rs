//! Record a short scripted session and print its annotation file and analysis

use rabet_timeline::format::write_annotations;
use rabet_timeline::types::WallTime;
use rabet_timeline::{
    ActionMap, AnalysisInput, Analyzer, ManualClock, RecordingSession, ScriptedPlayer,
    SessionConfig, TriggerId,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let map = ActionMap::default();
    let mut session =
        RecordingSession::with_clock(SessionConfig::default(), ManualClock::new(WallTime::from_secs(0.0)));
    let mut player = ScriptedPlayer::playing_at(1_000);

    session.request_start(Some(60.0))?;
    session.handle_trigger(&player, TriggerId::from('o'), "")?;

    // (key, press at, release at) in position-clock milliseconds
    let presses = [('o', 4_500, 5_200), ('q', 6_000, 9_000), ('p', 20_000, 20_010)];
    for (key, onset, offset) in presses {
        let trigger = TriggerId::from(key);
        let label = map.resolve(&trigger)?.to_string();

        player.position_ms = onset;
        session.clock_mut().set(WallTime::from_secs(onset as f64 / 1000.0));
        session.on_position(&player);
        session.handle_trigger(&player, trigger.clone(), &label)?;

        player.position_ms = offset;
        session.clock_mut().set(WallTime::from_secs(offset as f64 / 1000.0));
        session.on_position(&player);
        session.handle_release(&player, &trigger)?;
    }

    player.position_ms = 61_000;
    session.on_position(&player);
    println!("state: {}\n", session.state());

    let timeline = session.into_timeline();
    let mut out = std::io::stdout().lock();
    write_annotations(&mut out, &timeline.snapshot(), timeline.test_duration_secs(), &map.labels())?;

    let result = Analyzer::default().analyze(&AnalysisInput::from_timeline("demo", &timeline));
    println!("\n{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

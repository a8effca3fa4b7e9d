// tests/survey.rs

use rnano::{Flags, Msg, Protocol, SpError};
use std::time::Duration;
mod common;

const LONG_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_survey_collects_responses_until_deadline() -> Result<(), SpError> {
  let ctx = common::test_context();
  let surveyor = common::socket(&ctx, Protocol::Surveyor);
  surveyor.set_surveyor_deadline(Duration::from_millis(300))?;
  assert_eq!(surveyor.surveyor_deadline()?, Duration::from_millis(300));
  let endpoint = common::bind_ephemeral(&surveyor).await?;

  let mut respondents = Vec::new();
  for _ in 0..3 {
    let respondent = common::socket(&ctx, Protocol::Respondent);
    respondent.connect(&endpoint).await?;
    respondents.push(respondent);
  }
  common::wait_for_connections(&surveyor, 3, LONG_TIMEOUT).await;

  surveyor.send(Msg::from_static(b"status?")).await?;
  for (i, respondent) in respondents.iter().enumerate() {
    let survey = common::recv_timeout(respondent, LONG_TIMEOUT).await?;
    assert_eq!(survey.data(), b"status?");
    respondent.send(Msg::from(format!("ok {}", i))).await?;
  }

  let mut answers = Vec::new();
  for _ in 0..3 {
    answers.push(surveyor.recv().await?);
  }
  answers.sort_by(|a, b| a.data().cmp(b.data()));
  assert_eq!(answers[0].data(), b"ok 0");
  assert_eq!(answers[2].data(), b"ok 2");

  // Nothing more arrives: the deadline ends the survey.
  assert!(matches!(surveyor.recv().await, Err(SpError::Timeout)));
  assert!(matches!(surveyor.recv().await, Err(SpError::InvalidState(_))));

  ctx.term().await;
  Ok(())
}

#[tokio::test]
async fn test_late_responses_are_discarded() -> Result<(), SpError> {
  let ctx = common::test_context();
  let surveyor = common::socket(&ctx, Protocol::Surveyor);
  surveyor.set_surveyor_deadline(Duration::from_millis(100))?;
  let respondent = common::socket(&ctx, Protocol::Respondent);
  let endpoint = common::bind_ephemeral(&surveyor).await?;
  respondent.connect(&endpoint).await?;
  common::wait_for_connections(&surveyor, 1, LONG_TIMEOUT).await;

  surveyor.send(Msg::from_static(b"first")).await?;
  assert_eq!(common::recv_timeout(&respondent, LONG_TIMEOUT).await?.data(), b"first");
  assert!(matches!(surveyor.recv().await, Err(SpError::Timeout)));

  // Answer the expired survey, then a new one; only the new answer is delivered.
  respondent.send(Msg::from_static(b"late")).await?;
  surveyor.set_surveyor_deadline(Duration::from_secs(1))?;
  surveyor.send(Msg::from_static(b"second")).await?;
  assert_eq!(common::recv_timeout(&respondent, LONG_TIMEOUT).await?.data(), b"second");
  respondent.send(Msg::from_static(b"fresh")).await?;
  assert_eq!(surveyor.recv().await?.data(), b"fresh");

  ctx.term().await;
  Ok(())
}

#[tokio::test]
async fn test_respondent_state_and_surveyor_without_survey() -> Result<(), SpError> {
  let ctx = common::test_context();
  let surveyor = common::socket(&ctx, Protocol::Surveyor);
  let respondent = common::socket(&ctx, Protocol::Respondent);

  assert!(matches!(surveyor.recv().await, Err(SpError::InvalidState(_))));
  assert!(matches!(
    respondent.send(Msg::from_static(b"unasked")).await,
    Err(SpError::InvalidState(_))
  ));

  ctx.term().await;
  Ok(())
}

#[tokio::test]
async fn test_raw_surveyor_passes_survey_id_through() -> Result<(), SpError> {
  let ctx = common::test_context();
  let surveyor = common::raw_socket(&ctx, Protocol::Surveyor);
  let respondent = common::socket(&ctx, Protocol::Respondent);
  let endpoint = common::bind_ephemeral(&surveyor).await?;
  respondent.connect(&endpoint).await?;
  common::wait_for_connections(&surveyor, 1, LONG_TIMEOUT).await;

  let survey_id = rnano::Control::from_bytes(bytes::Bytes::from_static(&[0x80, 0, 0, 42]));
  surveyor.send_with_control(Msg::from_static(b"raw survey"), survey_id, Flags::empty()).await?;
  assert_eq!(common::recv_timeout(&respondent, LONG_TIMEOUT).await?.data(), b"raw survey");
  respondent.send(Msg::from_static(b"raw answer")).await?;

  let (answer, control) = surveyor.recv_with_control(Flags::empty()).await?;
  assert_eq!(answer.data(), b"raw answer");
  assert_eq!(control.as_bytes(), &[0x80, 0, 0, 42]);

  // A control without the end-of-backtrace marker is not a survey id.
  let bad = rnano::Control::from_bytes(bytes::Bytes::from_static(&[0, 0, 0, 42]));
  assert!(matches!(
    surveyor.send_with_control(Msg::from_static(b"x"), bad, Flags::empty()).await,
    Err(SpError::ProtocolViolation(_))
  ));

  ctx.term().await;
  Ok(())
}

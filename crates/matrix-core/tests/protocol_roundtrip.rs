//! Integration tests for the matrix-core protocol codec and session.
//!
//! These tests drive the public API the way the server does: raw bytes are
//! decoded into frames, frames into requests, requests are applied to a
//! [`Session`], and replies are encoded back into frames.

use matrix_core::protocol::codec::{
    decode_frame, decode_matrix, decode_request, decode_response, encode_frame, encode_matrix,
    encode_request, encode_response,
};
use matrix_core::{
    column_minima_scatter, JobConfig, JobOutcome, JobStatus, Matrix, Request, Response, Session,
    SessionOutcome, Tag,
};

/// Deterministic pseudo-random values (64-bit LCG) covering the full i32 range.
fn pseudo_random_matrix(n: usize, seed: u64) -> Matrix {
    let mut state = seed;
    let values = (0..n * n)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (state >> 32) as i32
        })
        .collect();
    Matrix::from_flat(n, values).expect("square buffer")
}

/// Passes a frame through its byte encoding.
fn over_the_wire(tag: u8, payload: &[u8]) -> (u8, Vec<u8>) {
    let bytes = encode_frame(tag, payload).expect("frame fits");
    let (frame, consumed) = decode_frame(&bytes).expect("decode must succeed");
    assert_eq!(consumed, bytes.len(), "all bytes must be consumed");
    (frame.tag, frame.payload)
}

#[test]
fn test_matrix_round_trip_up_to_64() {
    for n in [1usize, 2, 3, 17, 64] {
        let original = pseudo_random_matrix(n, n as u64);
        let (_, payload) = over_the_wire(Tag::Matrix as u8, &encode_matrix(&original));
        assert_eq!(decode_matrix(n, &payload).expect("decode"), original, "n = {n}");
    }
}

#[test]
fn test_matrix_round_trip_preserves_extremes() {
    let original = Matrix::from_rows(vec![vec![i32::MIN, i32::MAX], vec![0, -1]]).unwrap();
    assert_eq!(decode_matrix(2, &encode_matrix(&original)).unwrap(), original);
}

#[test]
fn test_frame_round_trip_for_every_tag_byte() {
    for tag in 0u8..=0xFF {
        let payload = vec![tag; (tag as usize) % 11];
        assert_eq!(over_the_wire(tag, &payload), (tag, payload));
    }
}

#[test]
fn test_requests_survive_encoding() {
    let requests = [
        Request::Config(JobConfig { n: 3, worker_count: 2 }),
        Request::Matrix(encode_matrix(&pseudo_random_matrix(3, 9))),
        Request::StartProcess,
        Request::StatusRequest,
    ];
    for request in requests {
        let frame = encode_request(&request);
        let (tag, payload) = over_the_wire(frame.tag, &frame.payload);
        let decoded = decode_request(&matrix_core::Frame { tag, payload }).expect("decode");
        assert_eq!(decoded, request);
    }
}

#[test]
fn test_full_session_scenario_through_codec() {
    let mut session = Session::new();
    let input = Matrix::from_rows(vec![vec![5, 2, 9], vec![1, 8, 3], vec![7, 4, 6]]).unwrap();
    let expected = Matrix::from_rows(vec![vec![5, 2, 3], vec![1, 2, 3], vec![1, 4, 6]]).unwrap();
    let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();

    // CONFIG(n=3, workers=1) then STATUS → NotStarted
    let cfg = encode_request(&Request::Config(JobConfig { n: 3, worker_count: 1 }));
    assert_eq!(
        session.handle(decode_request(&cfg).unwrap()).unwrap(),
        SessionOutcome::Accepted
    );
    let status = session.handle(Request::StatusRequest).unwrap();
    assert_eq!(status, SessionOutcome::Reply(Response::Status(JobStatus::NotStarted)));

    // MATRIX then START → InProgress with a ticket
    session
        .handle(Request::Matrix(encode_matrix(&input)))
        .expect("matrix accepted");
    let ticket = match session.handle(Request::StartProcess).unwrap() {
        SessionOutcome::StartJob { ticket, reply } => {
            let frame = encode_response(&reply);
            assert_eq!(
                decode_response(&frame).unwrap(),
                Response::Status(JobStatus::InProgress)
            );
            ticket
        }
        other => panic!("expected StartJob, got {other:?}"),
    };

    // Run the job the way the server would, then poll for the RESULT frame.
    let result = column_minima_scatter(&ticket.matrix, ticket.n, ticket.worker_count, &pool)
        .expect("valid job");
    session.complete_job(JobOutcome::Completed(result));

    let reply = match session.handle(Request::StatusRequest).unwrap() {
        SessionOutcome::Reply(reply) => reply,
        other => panic!("expected Reply, got {other:?}"),
    };
    let frame = encode_response(&reply);
    assert_eq!(frame.tag, Tag::Result as u8);
    assert_eq!(decode_response(&frame).unwrap(), Response::Result(expected));
}

#[test]
fn test_determinism_across_worker_counts_for_random_input() {
    let pool = rayon::ThreadPoolBuilder::new().num_threads(3).build().unwrap();
    let n = 40;
    let input = pseudo_random_matrix(n, 0xC0FFEE);
    let baseline = column_minima_scatter(&input, n, 1, &pool).unwrap();
    for workers in [2, 3, 7, 39, 40] {
        assert_eq!(column_minima_scatter(&input, n, workers, &pool).unwrap(), baseline);
    }
}

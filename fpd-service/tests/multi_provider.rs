mod harness;

use harness::wait::eventually;
use harness::TestHarness;

// Three providers against one chain: each commits its own randomness, each
// votes at the first height with power, and none interferes with another.
#[tokio::test]
async fn three_providers_vote_independently() {
    let tm = TestHarness::new(TestHarness::fast_config());
    tm.chain.advance_to_height(3).unwrap();

    let mut btc_pks = Vec::new();
    for index in 0..3 {
        let btc_pk = tm.create_and_register_provider(&format!("multi-{}", index)).await;
        tm.chain.set_voting_power(&btc_pk, 1, 100).unwrap();
        btc_pks.push(btc_pk);
    }

    tm.app.start_handling_all().await.unwrap();
    assert_eq!(tm.app.list_finality_provider_instances().len(), 3);

    for btc_pk in &btc_pks {
        let instance = tm.app.get_finality_provider_instance(btc_pk).unwrap();
        eventually("provider voted at height 1", move || instance.last_voted_height() >= 1).await;
    }
    tm.app.stop().await.unwrap();

    let expected_hash = tm.chain.block_at_height(1).unwrap().hash;
    for btc_pk in &btc_pks {
        let votes = tm.chain.votes_of(btc_pk).unwrap();
        assert!(votes.contains(&(1, expected_hash)), "provider {} missing its vote at height 1", btc_pk);

        let commits = tm.chain.commit_log().unwrap();
        let own: Vec<_> = commits.iter().filter(|commit| commit.btc_pk == *btc_pk).collect();
        assert_eq!(own.len(), 1, "provider {} should have exactly one commit", btc_pk);

        let stored = tm.stored_record(btc_pk);
        assert!(stored.last_voted_height >= 1);
        assert!(stored.last_voted_height <= stored.last_processed_height);
    }
}

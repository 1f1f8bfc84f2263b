mod harness;

use harness::wait::eventually;
use harness::{TestHarness, TEST_PUB_RAND_NUM};

#[tokio::test]
async fn casts_a_vote_at_the_first_height_with_voting_power() {
    let tm = TestHarness::new(TestHarness::fast_config());
    tm.chain.advance_to_height(10).unwrap();

    let btc_pk = tm.create_and_register_provider("happy-vote").await;
    tm.chain.set_voting_power(&btc_pk, 5, 100).unwrap();

    let instance = tm.start_instance(&btc_pk).await;
    {
        let instance = instance.clone();
        eventually("vote at height 5 submitted", move || instance.last_voted_height() >= 5).await;
    }
    instance.stop().await.unwrap();

    let votes = tm.chain.votes_of(&btc_pk).unwrap();
    let expected_hash = tm.chain.block_at_height(5).unwrap().hash;
    assert!(votes.contains(&(5, expected_hash)), "expected a vote for height 5 over its block hash");
    // heights without voting power were skipped, not voted
    assert!(votes.iter().all(|(height, _)| *height >= 5));

    let stored = tm.stored_record(&btc_pk);
    assert!(stored.last_voted_height >= 5);
    assert!(stored.last_voted_height <= stored.last_processed_height);
}

#[tokio::test]
async fn commits_randomness_ahead_before_the_first_vote() {
    let tm = TestHarness::new(TestHarness::fast_config());
    // chain sits at height 1; power from the start
    let btc_pk = tm.create_and_register_provider("rand-ahead").await;
    tm.chain.set_voting_power(&btc_pk, 1, 100).unwrap();

    let instance = tm.start_instance(&btc_pk).await;
    {
        let instance = instance.clone();
        eventually("vote at height 1 submitted", move || instance.last_voted_height() >= 1).await;
    }
    instance.stop().await.unwrap();

    let commits = tm.chain.commit_log().unwrap();
    assert_eq!(commits.len(), 1, "exactly one randomness commit expected");
    assert_eq!(commits[0].start_height, 1);
    assert_eq!(commits[0].num_pub_rand, TEST_PUB_RAND_NUM as u64);
    assert_eq!(commits[0].btc_pk, btc_pk);
}

#[tokio::test]
async fn forced_commit_extends_the_committed_range() {
    let tm = TestHarness::new(TestHarness::fast_config());
    let btc_pk = tm.create_and_register_provider("forced-commit").await;
    tm.chain.set_voting_power(&btc_pk, 1, 100).unwrap();

    let instance = tm.start_instance(&btc_pk).await;
    {
        let instance = instance.clone();
        eventually("initial commit landed", move || instance.last_voted_height() >= 1).await;
    }

    let tx = instance.commit_pub_rand(5).await.unwrap();
    assert!(tx.is_some());
    instance.stop().await.unwrap();

    let commits = tm.chain.commit_log().unwrap();
    assert_eq!(commits.len(), 2);
    // the forced batch starts right after the committed tip
    assert_eq!(commits[1].start_height, commits[0].start_height + commits[0].num_pub_rand);
    assert_eq!(commits[1].num_pub_rand, 5);
}

#[tokio::test]
async fn cursors_stay_ordered_while_the_chain_advances() {
    let tm = TestHarness::new(TestHarness::fast_config());
    tm.chain.advance_to_height(6).unwrap();

    let btc_pk = tm.create_and_register_provider("cursor-order").await;
    tm.chain.set_voting_power(&btc_pk, 3, 50).unwrap();

    let instance = tm.start_instance(&btc_pk).await;
    {
        let instance = instance.clone();
        eventually("processed up to height 6", move || instance.last_processed_height() >= 6).await;
    }

    tm.chain.advance_to_height(9).unwrap();
    {
        let instance = instance.clone();
        eventually("processed up to height 9", move || instance.last_processed_height() >= 9).await;
    }
    instance.stop().await.unwrap();

    let stored = tm.stored_record(&btc_pk);
    assert!(stored.last_voted_height <= stored.last_processed_height);
    assert_eq!(stored.last_processed_height, 9);
}
